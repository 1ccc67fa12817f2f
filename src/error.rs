// This module defines error types for the tplc orchestrator using the thiserror crate
// for idiomatic Rust error handling. CompileError is the main error enum covering the
// failure classes a compile call can surface: I/O failures (transient, retryable),
// structured compile diagnostics (carry the parsed diagnostic text), timeouts and
// aborts (artifact state unknown), missing compiler executables, configuration
// problems, and internal programming errors. TableError covers the debug-table codec,
// where only a malformed header is fatal to a parse. The module also provides
// CompileResult<T> as a convenience alias for Result<T, CompileError>.

//! Error types for the tplc orchestrator.
//!
//! Using thiserror for more idiomatic error handling.

use std::time::Duration;
use thiserror::Error;

/// Main error type for compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Transient I/O failure; safe to retry.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured compile diagnostics. Not retryable without source changes.
    #[error("{text}")]
    Diagnostics { text: String },

    /// The backend did not finish within the deadline. The artifact state is
    /// unknown; callers must not trust cached freshness after seeing this.
    #[error("compilation timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The backend was aborted before it completed.
    #[error("compilation aborted")]
    Aborted,

    /// The configured compiler executable could not be run.
    #[error(
        "cannot execute the compiler `{tool}`. This usually means the compiler \
         is not in the PATH or is incorrectly configured: {detail}"
    )]
    ToolNotFound { tool: String, detail: String },

    /// Invalid orchestrator configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Programming error inside a backend; never swallowed.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Error type for the debug-table codec.
///
/// Malformed individual line entries are skipped during parsing, so the only
/// fatal parse failure is a malformed header.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("malformed debug table header at line {line}")]
    BadHeader { line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
