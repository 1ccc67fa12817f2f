//! Orchestrator configuration.
//!
//! A `CompilerConfig` is plain data: the orchestrator owns one and passes it
//! to the backend it selects. Configuration can also be loaded from a TOML
//! file for the driver binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CompileError, CompileResult};
use crate::table::TABLE_SUFFIX;

/// Default wall-clock deadline for one backend dispatch.
pub const DEFAULT_MAX_COMPILE_TIME: Duration = Duration::from_secs(120);

/// Default number of files per compile chunk.
pub const DEFAULT_MAX_BATCH: i32 = 64;

/// Default generated-source extension.
pub const DEFAULT_SOURCE_EXT: &str = ".gen";

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Backend identifier: `internal`, `internal2`, `scriptc`, or the name
    /// of an external compiler executable.
    pub backend: String,
    /// Extra arguments passed to the backend.
    pub args: Vec<String>,
    /// Character encoding override for external tools.
    pub encoding: Option<String>,
    /// Files per chunk; negative means unbounded, zero means one per chunk.
    pub max_batch: i32,
    /// Wall-clock deadline for one dispatch.
    pub max_compile_time: Duration,
    /// Root the generated sources live under.
    pub source_dir: PathBuf,
    /// Root the compiled artifacts land in.
    pub artifact_dir: PathBuf,
    /// Generated-source extension, including the dot.
    pub source_ext: String,
    /// Extra search-path fragments appended to the assembled classpath.
    pub extra_classpath: Vec<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            backend: "internal".to_string(),
            args: Vec::new(),
            encoding: None,
            max_batch: DEFAULT_MAX_BATCH,
            max_compile_time: DEFAULT_MAX_COMPILE_TIME,
            source_dir: PathBuf::from("."),
            artifact_dir: PathBuf::from("."),
            source_ext: DEFAULT_SOURCE_EXT.to_string(),
            extra_classpath: Vec::new(),
        }
    }
}

impl CompilerConfig {
    /// Set the extra arguments from a whitespace- or comma-separated string.
    pub fn set_args_str(&mut self, args: &str) {
        self.args = args
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Normalize a compile request path to its generated source name:
    /// the last extension is replaced by `source_ext`.
    pub fn source_name(&self, file: &str) -> String {
        format!("{}{}", strip_last_ext(file), self.source_ext)
    }

    /// Resolve a compile request path to its generated source file.
    pub fn source_path(&self, file: &str) -> PathBuf {
        self.source_dir.join(self.source_name(file))
    }

    /// Resolve a compile request path to its artifact file.
    pub fn artifact_path(&self, file: &str) -> PathBuf {
        self.artifact_dir.join(format!("{}.o", strip_last_ext(file)))
    }

    /// The side-car debug table sits next to the source.
    pub fn table_path(&self, file: &str) -> PathBuf {
        self.source_dir.join(format!("{file}{TABLE_SUFFIX}"))
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// unset keys.
    pub fn from_toml(path: &Path) -> CompileResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn from_toml_str(text: &str) -> CompileResult<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|err| CompileError::Config(err.to_string()))?;
        Ok(raw.apply(Self::default()))
    }
}

fn strip_last_ext(file: &str) -> &str {
    match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    backend: Option<String>,
    args: Option<String>,
    encoding: Option<String>,
    max_batch: Option<i32>,
    max_compile_time_secs: Option<u64>,
    source_dir: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    source_ext: Option<String>,
    extra_classpath: Option<Vec<PathBuf>>,
}

impl RawConfig {
    fn apply(self, mut config: CompilerConfig) -> CompilerConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(args) = self.args {
            config.set_args_str(&args);
        }
        if let Some(encoding) = self.encoding {
            config.encoding = Some(encoding);
        }
        if let Some(max_batch) = self.max_batch {
            config.max_batch = max_batch;
        }
        if let Some(secs) = self.max_compile_time_secs {
            config.max_compile_time = Duration::from_secs(secs);
        }
        if let Some(source_dir) = self.source_dir {
            config.source_dir = source_dir;
        }
        if let Some(artifact_dir) = self.artifact_dir {
            config.artifact_dir = artifact_dir;
        }
        if let Some(source_ext) = self.source_ext {
            config.source_ext = source_ext;
        }
        if let Some(extra) = self.extra_classpath {
            config.extra_classpath = extra;
        }
        config
    }
}
