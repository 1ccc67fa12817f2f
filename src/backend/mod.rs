// This module defines the polymorphic backend contract: a backend is one ephemeral
// unit of compile work that either produces artifacts for every requested source or
// reports a classified failure, and that can be aborted best-effort while running.
// Variants are selected by the configured backend identifier: the in-process internal
// backends (two artifact-format revisions), the alt-language script tool, and a
// catch-all external-tool backend that treats the identifier as an executable name.
// The dispatch submodule is the shared run-on-worker, wait-with-deadline, abort
// helper that wraps any variant.

//! Compile backends and the uniform contract they satisfy.

pub mod dispatch;
pub mod external;
pub mod internal;
pub mod script;

pub use dispatch::dispatch;
pub use external::ExternalBackend;
pub use internal::{ArtifactRevision, InternalBackend};
pub use script::ScriptBackend;

use std::sync::{Arc, Mutex};

use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::line_map::LineMap;

/// Shared sink a backend populates with the line map it discovers while
/// compiling.
pub type LineMapSink = Arc<Mutex<LineMap>>;

/// One compile request handed to a backend: source identifiers relative to
/// the source root, plus the optional line-map sink.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub paths: Vec<String>,
    pub line_map: Option<LineMapSink>,
}

/// Uniform backend contract.
pub trait Backend: Send + Sync {
    /// Identifier used in log messages.
    fn name(&self) -> &str;

    /// Run the compile to completion. May block indefinitely; bounding the
    /// wait is the dispatcher's job, not the backend's.
    ///
    /// On failure the backend must not leave an artifact that looks valid:
    /// either no artifact, or a clearly incomplete one.
    fn run(&self, job: &CompileJob) -> CompileResult<()>;

    /// Best-effort abort. May be a no-op for backends that cannot be safely
    /// interrupted; must never panic. Offers no completion guarantee, so
    /// callers treat a timed-out compile as "unknown artifact state".
    fn abort(&self);
}

/// Select a backend for the configured identifier.
pub fn select_backend(config: &CompilerConfig, search_path: String) -> Arc<dyn Backend> {
    match config.backend.as_str() {
        "internal" => Arc::new(InternalBackend::new(config.clone(), ArtifactRevision::V1)),
        "internal2" => Arc::new(InternalBackend::new(config.clone(), ArtifactRevision::V2)),
        "scriptc" => Arc::new(ScriptBackend::new(config.clone(), search_path)),
        _ => Arc::new(ExternalBackend::new(config.clone(), search_path)),
    }
}
