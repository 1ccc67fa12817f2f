//! Run a backend on the worker pool and wait with a deadline.
//!
//! The completion slot is a tri-state: empty while the backend runs, then
//! the recorded outcome. If the deadline elapses first the dispatcher logs,
//! calls `abort()` once, and reports whatever outcome exists at that point;
//! with none recorded the timeout itself is the failure.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{Backend, CompileJob};
use crate::error::{CompileError, CompileResult};
use crate::pool::WorkerPool;

type Slot = Mutex<Option<Option<CompileError>>>;

pub fn dispatch(
    pool: &WorkerPool,
    backend: Arc<dyn Backend>,
    job: CompileJob,
    limit: Duration,
) -> CompileResult<()> {
    let shared: Arc<(Slot, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));

    let worker_shared = Arc::clone(&shared);
    let worker_backend = Arc::clone(&backend);
    pool.execute(move || {
        // A panicking backend must not unwind the worker thread: the pool
        // would lose it for good and the caller would only ever observe a
        // timeout. Record the panic as the outcome instead.
        let outcome = match catch_unwind(AssertUnwindSafe(|| worker_backend.run(&job))) {
            Ok(result) => result.err(),
            Err(payload) => Some(CompileError::Internal(format!(
                "backend {} panicked: {}",
                worker_backend.name(),
                panic_text(payload.as_ref())
            ))),
        };
        let (slot, signal) = &*worker_shared;
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(outcome);
        }
        signal.notify_all();
    });

    let (slot, signal) = &*shared;
    let deadline = Instant::now() + limit;

    let mut guard = slot
        .lock()
        .map_err(|_| CompileError::Internal("dispatch slot poisoned".into()))?;
    while guard.is_none() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let (next, _) = signal
            .wait_timeout(guard, deadline - now)
            .map_err(|_| CompileError::Internal("dispatch slot poisoned".into()))?;
        guard = next;
    }

    match guard.take() {
        Some(None) => Ok(()),
        Some(Some(err)) => Err(err),
        None => {
            drop(guard);
            log::warn!(
                "compilation with backend {} timed out after {limit:?}; aborting",
                backend.name()
            );
            backend.abort();

            // The backend may have recorded an outcome racing the deadline.
            if let Ok(mut guard) = slot.lock() {
                match guard.take() {
                    Some(Some(err)) => return Err(err),
                    Some(None) => return Ok(()),
                    None => {}
                }
            }
            Err(CompileError::Timeout { limit })
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}
