//! tplc driver - compile generated sources from the command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use tplc::compiler::Compiler;
use tplc::config::CompilerConfig;
use tplc::error::CompileError;

#[derive(Parser)]
#[command(name = "tplc")]
#[command(version)]
#[command(about = "Compile generated sources into object artifacts", long_about = None)]
struct Cli {
    /// Backend identifier: internal, internal2, scriptc, or an external
    /// compiler executable
    #[arg(long)]
    backend: Option<String>,

    /// Directory the generated sources live under
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Directory the artifacts land in
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Files per compile chunk (negative: unbounded, 0: one per chunk)
    #[arg(long)]
    batch: Option<i32>,

    /// Wall-clock compile deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip files whose artifact is at least as new as the source
    #[arg(long)]
    if_modified: bool,

    /// Load settings from a TOML file before applying flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra arguments for the backend, whitespace- or comma-separated
    #[arg(long)]
    args: Option<String>,

    /// Generated source files, relative to the source directory
    #[arg(required = true)]
    files: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CompileError::Diagnostics { text }) => {
            eprintln!("{text}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("tplc: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CompileError> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_toml(path)?,
        None => CompilerConfig::default(),
    };

    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(source_dir) = cli.source_dir {
        config.source_dir = source_dir;
    }
    if let Some(out_dir) = cli.out_dir {
        config.artifact_dir = out_dir;
    }
    if let Some(batch) = cli.batch {
        config.max_batch = batch;
    }
    if let Some(secs) = cli.timeout {
        config.max_compile_time = Duration::from_secs(secs);
    }
    if let Some(args) = &cli.args {
        config.set_args_str(args);
    }

    let compiler = Compiler::new(config)?;

    if cli.if_modified {
        for file in &cli.files {
            compiler.compile(file, None, true)?;
        }
    } else {
        compiler.compile_batch(&cli.files)?;
    }

    log::info!("{}", compiler.stats());
    Ok(())
}
