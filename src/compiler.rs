// This module is the orchestrator. A Compiler owns the configuration, the worker
// pool, and a process-wide serialization lock: at most one chunk compiles at a time,
// so concurrent requests for overlapping generated sources cannot race each other's
// artifacts. Requests arrive one file at a time (with optional incremental skip and
// an optional line-map sink) or as a batch, which is deduplicated, chunked by
// max_batch, and compiled chunk by chunk with the first I/O failure remembered and
// later ones logged. After a chunk succeeds, each source's side-car debug table is
// merged into its artifact; merge failures never fail the compile. The search path
// handed to external tools is assembled from the base entries, any delegate chain
// (parent first), the configured extras, and the source/artifact roots.

//! Compilation orchestrator.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backend::{dispatch, select_backend, Backend, CompileJob, LineMapSink};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::pool::WorkerPool;
use crate::table::merge::merge_debug_table;

/// Supplies search-path entries, possibly chained to a parent supplier.
pub trait ClasspathSource: Send + Sync {
    fn entries(&self) -> Vec<PathBuf>;
    fn parent(&self) -> Option<&dyn ClasspathSource> {
        None
    }
}

/// Cumulative counters across the orchestrator's lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompileStats {
    pub files_compiled: u64,
    pub source_bytes: u64,
}

impl std::fmt::Display for CompileStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files compiled, {} source bytes",
            self.files_compiled, self.source_bytes
        )
    }
}

pub struct Compiler {
    config: CompilerConfig,
    base_classpath: Vec<PathBuf>,
    delegate: Option<Box<dyn ClasspathSource>>,
    lock: Mutex<()>,
    pool: WorkerPool,
    stats: Mutex<CompileStats>,
    backend_override: Option<Arc<dyn Backend>>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> CompileResult<Self> {
        let pool = WorkerPool::new(WorkerPool::DEFAULT_THREADS)?;
        Ok(Self {
            config,
            base_classpath: Vec::new(),
            delegate: None,
            lock: Mutex::new(()),
            pool,
            stats: Mutex::new(CompileStats::default()),
            backend_override: None,
        })
    }

    /// Replace backend selection with a fixed backend.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend_override = Some(backend);
        self
    }

    pub fn add_classpath(&mut self, entry: impl Into<PathBuf>) {
        self.base_classpath.push(entry.into());
    }

    pub fn set_delegate(&mut self, delegate: Box<dyn ClasspathSource>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn stats(&self) -> CompileStats {
        self.stats.lock().map(|guard| *guard).unwrap_or_default()
    }

    /// Assembled search path: base entries, delegate chain parent-first,
    /// configured extras, then the source and artifact roots. Duplicates
    /// keep their first position.
    pub fn classpath(&self) -> Vec<PathBuf> {
        let mut entries = self.base_classpath.clone();
        if let Some(delegate) = &self.delegate {
            collect_delegate_entries(delegate.as_ref(), &mut entries);
        }
        entries.extend(self.config.extra_classpath.iter().cloned());
        if self.config.source_dir != self.config.artifact_dir {
            entries.push(self.config.source_dir.clone());
        }
        entries.push(self.config.artifact_dir.clone());

        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(entry.clone()));
        entries
    }

    pub fn classpath_string(&self) -> String {
        let entries = self.classpath();
        match env::join_paths(&entries) {
            Ok(joined) => joined.to_string_lossy().into_owned(),
            Err(_) => entries
                .iter()
                .map(|entry| entry.display().to_string())
                .collect::<Vec<_>>()
                .join(":"),
        }
    }

    /// Compile one file. With `if_modified` the compile is skipped when the
    /// artifact is at least as new as the source; a source that no longer
    /// exists leaves an existing artifact in place. The staleness check runs
    /// under the lock so a concurrent compile of the same file is observed.
    pub fn compile(
        &self,
        file: &str,
        line_map: Option<LineMapSink>,
        if_modified: bool,
    ) -> CompileResult<()> {
        let source = self.config.source_path(file);
        let artifact = self.config.artifact_path(file);

        let _guard = self
            .lock
            .lock()
            .map_err(|_| CompileError::Internal("compile lock poisoned".into()))?;

        if if_modified && artifact_up_to_date(&source, &artifact)? {
            log::debug!("{} is up to date", artifact.display());
            return Ok(());
        }

        if artifact.exists() {
            // A stale artifact must not survive a failed recompile.
            if let Err(err) = fs::remove_file(&artifact) {
                log::warn!("cannot remove stale {}: {err}", artifact.display());
            }
        }

        self.compile_chunk(&[self.config.source_name(file)], line_map)
    }

    /// Compile many files: stable dedup, chunked by `max_batch` (negative
    /// means one unbounded chunk, zero means one file per chunk), each
    /// chunk sorted. The first I/O error is remembered and returned after
    /// the remaining chunks run; any other error stops the batch.
    pub fn compile_batch(&self, files: &[String]) -> CompileResult<()> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = files
            .iter()
            .filter(|file| seen.insert(file.as_str()))
            .map(|file| self.config.source_name(file))
            .collect();
        if unique.is_empty() {
            return Ok(());
        }

        let chunk_size = match self.config.max_batch {
            n if n < 0 => unique.len(),
            0 => 1,
            n => n as usize,
        };

        let _guard = self
            .lock
            .lock()
            .map_err(|_| CompileError::Internal("compile lock poisoned".into()))?;

        let mut remembered: Option<CompileError> = None;
        for chunk in unique.chunks(chunk_size) {
            let mut chunk = chunk.to_vec();
            chunk.sort();

            match self.compile_chunk(&chunk, None) {
                Ok(()) => {}
                Err(CompileError::Io(err)) => {
                    if remembered.is_some() {
                        log::warn!("batch compile I/O error: {err}");
                    } else {
                        remembered = Some(CompileError::Io(err));
                    }
                }
                Err(other) => return Err(other),
            }
        }

        match remembered {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn compile_chunk(&self, paths: &[String], line_map: Option<LineMapSink>) -> CompileResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        for path in paths {
            log::info!("compiling {path} [{}]", self.config.backend);
        }

        let backend = match &self.backend_override {
            Some(backend) => Arc::clone(backend),
            None => select_backend(&self.config, self.classpath_string()),
        };
        let job = CompileJob {
            paths: paths.to_vec(),
            line_map,
        };
        dispatch(&self.pool, backend, job, self.config.max_compile_time)?;

        self.record_stats(paths);

        for path in paths {
            if !path.ends_with(&self.config.source_ext) {
                continue;
            }
            let artifact = self.config.artifact_path(path);
            let table = self.config.table_path(path);
            if artifact.is_file() && table.is_file() {
                merge_debug_table(&artifact, &table);
            }
        }
        Ok(())
    }

    fn record_stats(&self, paths: &[String]) {
        let bytes: u64 = paths
            .iter()
            .filter_map(|path| fs::metadata(self.config.source_dir.join(path)).ok())
            .map(|meta| meta.len())
            .sum();
        if let Ok(mut stats) = self.stats.lock() {
            stats.files_compiled += paths.len() as u64;
            stats.source_bytes += bytes;
        }
    }
}

fn collect_delegate_entries(source: &dyn ClasspathSource, out: &mut Vec<PathBuf>) {
    if let Some(parent) = source.parent() {
        collect_delegate_entries(parent, out);
    }
    out.extend(source.entries());
}

fn artifact_up_to_date(source: &Path, artifact: &Path) -> CompileResult<bool> {
    let artifact_meta = match fs::metadata(artifact) {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    // A missing source counts as infinitely old: the existing artifact
    // stands and the compile is skipped.
    let source_time = match fs::metadata(source).and_then(|meta| meta.modified()) {
        Ok(time) => time,
        Err(_) => return Ok(true),
    };
    let artifact_time = artifact_meta.modified()?;
    Ok(artifact_time >= source_time)
}

/// Mangle a source path into an identifier safe for symbol tables.
///
/// `/` becomes `._` (collapsed runs, dropped at the start), `.` becomes
/// `__`, `_` escapes to `_0`, and anything not alphanumeric is hex-escaped
/// as `_2xx` or `_4xxxx`.
pub fn mangle_name(name: &str) -> String {
    if name.is_empty() {
        return "_z".to_string();
    }

    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 8);
    out.push('_');

    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            '/' => {
                if i == 0 {
                    continue;
                }
                let last = out.chars().last();
                let next = chars.get(i + 1);
                if last != Some('.') && matches!(next, Some(&c) if c != '/') {
                    out.push_str("._");
                }
            }
            '.' => out.push_str("__"),
            '_' => out.push_str("_0"),
            c if c.is_alphanumeric() => out.push(c),
            c if (c as u32) <= 256 => {
                out.push_str(&format!("_2{:02x}", c as u32));
            }
            c => {
                out.push_str(&format!("_4{:04x}", c as u32));
            }
        }
    }
    out
}
