//! tplc - Generated-Source Compilation Orchestrator.
//!
//! tplc drives the compilation of machine-generated source files (template
//! output, `.gen` by convention) into ELF object artifacts, and maintains
//! the line maps that translate positions in the generated text back to
//! the templates they came from. Diagnostics and stack traces are
//! rewritten through those maps so tooling reports template positions,
//! never generated ones.
//!
//! # Primary Usage
//!
//! ```ignore
//! use tplc::compiler::Compiler;
//! use tplc::config::CompilerConfig;
//!
//! let mut config = CompilerConfig::default();
//! config.source_dir = "work/gen".into();
//! config.artifact_dir = "work/obj".into();
//!
//! let compiler = Compiler::new(config)?;
//! compiler.compile_batch(&files)?;
//! ```
//!
//! # Architecture
//!
//! - [`compiler`] - Orchestrator: serialization lock, batching, dispatch
//! - [`backend`] - Compile backends (in-process, external tool, script)
//! - [`line_map`] - Generated-line to template-line mapping
//! - [`table`] - Debug-table text codec and ELF section merge
//! - [`diag`] - Dialect-specific diagnostic translation
//! - [`remap`] - Stack-trace remapping through embedded tables

pub mod backend;
pub mod compiler;
pub mod config;
pub mod diag;
pub mod error;
pub mod line_map;
pub mod pool;
pub mod remap;
pub mod table;

pub use backend::{Backend, CompileJob, LineMapSink};
pub use compiler::{mangle_name, CompileStats, Compiler};
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult, TableError};
pub use line_map::{LineMap, MappedLine};
pub use remap::{ArtifactResolver, Frame, StackTraceRemapper};
