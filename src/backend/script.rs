//! Alt-language script backend.
//!
//! `scriptc` compiles `.script` sources through the external script
//! toolchain. Process mechanics are shared with the external backend; the
//! argument shape (`--out-dir`) and the banner diagnostic dialect are its
//! own.

use std::fs;
use std::path::Path;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::external::run_command;
use super::{Backend, CompileJob};
use crate::config::CompilerConfig;
use crate::diag::banner::BannerDiagnosticParser;
use crate::diag::DiagnosticParser;
use crate::error::{CompileError, CompileResult};

pub const SCRIPT_TOOL: &str = "scriptc";

pub struct ScriptBackend {
    config: CompilerConfig,
    search_path: String,
    child: Mutex<Option<Child>>,
    aborted: AtomicBool,
}

impl ScriptBackend {
    pub fn new(config: CompilerConfig, search_path: String) -> Self {
        Self {
            config,
            search_path,
            child: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    fn argv(&self, job: &CompileJob) -> Vec<String> {
        let mut argv = vec![SCRIPT_TOOL.to_string()];
        argv.extend(self.config.args.iter().cloned());
        argv.push("--out-dir".into());
        argv.push(absolute(&self.config.artifact_dir));
        argv.extend(job.paths.iter().cloned());
        argv
    }

    fn finish(&self, job: &CompileJob, status: ExitStatus, captured: &[u8]) -> CompileResult<()> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(CompileError::Aborted);
        }
        if status.success() {
            return Ok(());
        }

        let guard = job.line_map.as_ref().and_then(|sink| sink.lock().ok());
        let errors = BannerDiagnosticParser.parse_errors(captured, guard.as_deref());
        let errors = errors.trim();

        if errors.contains("command not found") {
            return Err(CompileError::ToolNotFound {
                tool: SCRIPT_TOOL.to_string(),
                detail: errors.to_string(),
            });
        }

        let text = if errors.is_empty() {
            format!(
                "script compilation failed with status {status}:\n{}",
                String::from_utf8_lossy(captured)
            )
        } else {
            errors.to_string()
        };
        Err(CompileError::Diagnostics { text })
    }
}

impl Backend for ScriptBackend {
    fn name(&self) -> &str {
        SCRIPT_TOOL
    }

    fn run(&self, job: &CompileJob) -> CompileResult<()> {
        let argv = self.argv(job);
        let (status, captured) =
            run_command(&argv, &self.config.source_dir, &self.search_path, &self.child)?;
        self.finish(job, status, &captured)
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
