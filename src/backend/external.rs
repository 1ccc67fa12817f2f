// This module implements the external-tool backend: the configured backend identifier
// is taken as the name of a compiler executable, which is spawned with the assembled
// search path, the artifact directory, any encoding override and extra arguments, and
// the chunk's source paths. Stdout and stderr are captured interleaved; on a failed
// run the raw stream goes through the dialect's diagnostic scanner (with the line map
// when one was requested) to produce structured error text. abort() kills the child
// process best-effort. A shared run_command helper carries the spawn/drain/reap
// mechanics for the alt-language backend as well.

//! External compiler backends.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::{Backend, CompileJob};
use crate::config::CompilerConfig;
use crate::diag::parser_for_tool;
use crate::error::{CompileError, CompileResult};

pub struct ExternalBackend {
    config: CompilerConfig,
    search_path: String,
    child: Mutex<Option<Child>>,
    aborted: AtomicBool,
}

impl ExternalBackend {
    pub fn new(config: CompilerConfig, search_path: String) -> Self {
        Self {
            config,
            search_path,
            child: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    fn argv(&self, job: &CompileJob) -> Vec<String> {
        let mut argv = vec![self.config.backend.clone()];
        argv.extend(self.config.args.iter().cloned());

        if let Some(encoding) = &self.config.encoding {
            argv.push("-encoding".into());
            argv.push(encoding.clone());
        }

        argv.push("-d".into());
        argv.push(absolute(&self.config.artifact_dir));
        argv.push("-I".into());
        argv.push(self.search_path.clone());

        argv.extend(job.paths.iter().cloned());
        argv
    }

    fn finish(
        &self,
        job: &CompileJob,
        argv: &[String],
        status: ExitStatus,
        captured: &[u8],
    ) -> CompileResult<()> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(CompileError::Aborted);
        }

        let parser = parser_for_tool(&self.config.backend);
        let guard = job.line_map.as_ref().and_then(|sink| sink.lock().ok());
        let errors = parser.parse_errors(captured, guard.as_deref());
        let errors = errors.trim();

        // Tools have been seen to exit 0 without writing anything.
        let artifact_missing = job.paths.len() == 1
            && fs::metadata(self.config.artifact_path(&job.paths[0]))
                .map(|meta| meta.len() == 0)
                .unwrap_or(true);

        if status.success() && !artifact_missing {
            if !errors.is_empty() {
                log::warn!("{errors}");
            }
            return Ok(());
        }

        if errors.contains("command not found") {
            return Err(CompileError::ToolNotFound {
                tool: self.config.backend.clone(),
                detail: errors.to_string(),
            });
        }

        let text = if errors.is_empty() {
            let mut text = if status.success() {
                format!(
                    "compilation of '{}' did not produce an artifact.\n\
                     Check that the generated unit name matches its directory.\n",
                    job.paths.first().map(String::as_str).unwrap_or("?")
                )
            } else {
                "unknown compiler error executing:\n".to_string()
            };
            for arg in argv {
                text.push(' ');
                text.push_str(arg);
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(captured));
            text
        } else {
            errors.to_string()
        };

        Err(CompileError::Diagnostics { text })
    }
}

impl Backend for ExternalBackend {
    fn name(&self) -> &str {
        &self.config.backend
    }

    fn run(&self, job: &CompileJob) -> CompileResult<()> {
        let argv = self.argv(job);
        let (status, captured) =
            run_command(&argv, &self.config.source_dir, &self.search_path, &self.child)?;
        self.finish(job, &argv, status, &captured)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.kill();
            }
        }
    }
}

fn absolute(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Spawn `argv`, drain stdout+stderr interleaved, and reap the child.
///
/// The child handle sits in `child_slot` so an abort can reach it; reaping
/// polls rather than blocking so the slot's lock stays available.
pub(crate) fn run_command(
    argv: &[String],
    working_dir: &Path,
    search_path: &str,
    child_slot: &Mutex<Option<Child>>,
) -> CompileResult<(ExitStatus, Vec<u8>)> {
    let (tool, args) = argv
        .split_first()
        .ok_or_else(|| CompileError::Internal("empty backend command".into()))?;

    log::debug!("executing {argv:?}");

    let mut child = Command::new(tool)
        .args(args)
        .current_dir(working_dir)
        .env("TPLC_PATH", search_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                CompileError::ToolNotFound {
                    tool: tool.clone(),
                    detail: err.to_string(),
                }
            } else {
                CompileError::Io(err)
            }
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    {
        let mut guard = child_slot
            .lock()
            .map_err(|_| CompileError::Internal("backend child slot poisoned".into()))?;
        *guard = Some(child);
    }

    let stdout_drain = stdout.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stream.read_to_end(&mut buffer);
            buffer
        })
    });

    let mut captured = Vec::new();
    if let Some(mut stream) = stderr {
        let _ = stream.read_to_end(&mut captured);
    }
    if let Some(drain) = stdout_drain {
        if let Ok(buffer) = drain.join() {
            captured.extend_from_slice(&buffer);
        }
    }

    let status = loop {
        let mut guard = child_slot
            .lock()
            .map_err(|_| CompileError::Internal("backend child slot poisoned".into()))?;
        match guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    guard.take();
                    break status;
                }
                Ok(None) => {}
                Err(err) => {
                    guard.take();
                    return Err(err.into());
                }
            },
            None => return Err(CompileError::Aborted),
        }
        drop(guard);
        // A kill from abort() surfaces here through try_wait.
        thread::sleep(Duration::from_millis(10));
    };

    Ok((status, captured))
}
