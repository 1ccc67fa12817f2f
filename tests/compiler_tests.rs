use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use tplc::backend::{Backend, CompileJob};
use tplc::compiler::Compiler;
use tplc::config::CompilerConfig;
use tplc::error::{CompileError, CompileResult};

/// Records every chunk it is asked to compile.
struct RecordingBackend {
    chunks: Arc<Mutex<Vec<Vec<String>>>>,
    fail_io_on_first: bool,
}

impl RecordingBackend {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<Vec<String>>>>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                chunks: Arc::clone(&chunks),
                fail_io_on_first: false,
            }),
            chunks,
        )
    }
}

impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn run(&self, job: &CompileJob) -> CompileResult<()> {
        let mut chunks = self.chunks.lock().unwrap();
        chunks.push(job.paths.clone());
        if self.fail_io_on_first && chunks.len() == 1 {
            return Err(CompileError::Io(std::io::Error::other("disk trouble")));
        }
        Ok(())
    }

    fn abort(&self) {}
}

/// Sleeps until aborted; used to exercise the deadline path.
struct SleepyBackend {
    aborted: AtomicBool,
}

impl Backend for SleepyBackend {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn run(&self, _job: &CompileJob) -> CompileResult<()> {
        while !self.aborted.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        Err(CompileError::Aborted)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

fn test_config(dir: &tempfile::TempDir) -> CompilerConfig {
    CompilerConfig {
        source_dir: dir.path().to_path_buf(),
        artifact_dir: dir.path().to_path_buf(),
        ..CompilerConfig::default()
    }
}

#[test]
fn batch_deduplicates_and_compiles_one_sorted_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.max_batch = -1;

    let (backend, chunks) = RecordingBackend::new();
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    compiler
        .compile_batch(&["b.gen".into(), "a.gen".into(), "b.gen".into()])
        .unwrap();

    assert_eq!(*chunks.lock().unwrap(), vec![vec!["a.gen", "b.gen"]]);
}

#[test]
fn batch_of_one_splits_into_singleton_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.max_batch = 1;

    let (backend, chunks) = RecordingBackend::new();
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    compiler
        .compile_batch(&["b.gen".into(), "a.gen".into()])
        .unwrap();

    // Dedup keeps first-seen order; chunks of one cannot reorder.
    assert_eq!(*chunks.lock().unwrap(), vec![vec!["b.gen"], vec!["a.gen"]]);
}

#[test]
fn first_io_error_is_remembered_but_later_chunks_still_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.max_batch = 1;

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let backend = Arc::new(RecordingBackend {
        chunks: Arc::clone(&chunks),
        fail_io_on_first: true,
    });
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    let err = compiler
        .compile_batch(&["a.gen".into(), "b.gen".into()])
        .unwrap_err();

    assert!(matches!(err, CompileError::Io(_)));
    assert_eq!(chunks.lock().unwrap().len(), 2);
}

#[test]
fn deadline_produces_a_timeout_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.max_compile_time = Duration::from_millis(100);

    let backend = Arc::new(SleepyBackend {
        aborted: AtomicBool::new(false),
    });
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    let err = compiler
        .compile_batch(&["a.gen".into()])
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Timeout { .. } | CompileError::Aborted
    ));
}

#[test]
fn fresh_artifact_skips_the_compile() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    fs::write(dir.path().join("unit.gen"), "let x = 1;\n").unwrap();
    let artifact = dir.path().join("unit.o");
    fs::write(&artifact, b"stub").unwrap();
    let future = SystemTime::now() + Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&artifact)
        .unwrap()
        .set_modified(future)
        .unwrap();

    let (backend, chunks) = RecordingBackend::new();
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    compiler.compile("unit.gen", None, true).unwrap();
    assert!(chunks.lock().unwrap().is_empty());

    // Without the modification check the compile always runs.
    compiler.compile("unit.gen", None, false).unwrap();
    assert_eq!(chunks.lock().unwrap().len(), 1);
}

#[test]
fn missing_source_keeps_the_artifact_and_skips_the_compile() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    // No unit.gen on disk, only a previously built artifact.
    fs::write(dir.path().join("unit.o"), b"stub").unwrap();

    let (backend, chunks) = RecordingBackend::new();
    let compiler = Compiler::new(config).unwrap().with_backend(backend);

    compiler.compile("unit.gen", None, true).unwrap();
    assert!(chunks.lock().unwrap().is_empty());
    assert!(dir.path().join("unit.o").exists());
}

#[test]
fn unknown_backend_tool_is_reported_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.backend = "tplc-nonexistent-compiler".into();

    fs::write(dir.path().join("unit.gen"), "let x = 1;\n").unwrap();
    let compiler = Compiler::new(config).unwrap();

    let err = compiler.compile_batch(&["unit.gen".into()]).unwrap_err();
    assert!(matches!(err, CompileError::ToolNotFound { .. }), "{err}");
}

#[test]
fn internal_backend_compiles_end_to_end_and_counts_stats() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    fs::write(
        dir.path().join("unit.gen"),
        "//@ Home.tmpl:5\nlet x = 1;\n",
    )
    .unwrap();

    let compiler = Compiler::new(config).unwrap();
    compiler.compile_batch(&["unit.gen".into()]).unwrap();

    assert!(dir.path().join("unit.o").exists());
    let stats = compiler.stats();
    assert_eq!(stats.files_compiled, 1);
    assert!(stats.source_bytes > 0);
}

#[test]
fn side_car_merge_keeps_the_internal2_symbol() {
    use object::{Object as _, ObjectSection as _, ObjectSymbol as _};

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.backend = "internal2".into();

    fs::write(dir.path().join("unit.gen"), "//@ Home.tmpl:5\nlet x = 1;\n").unwrap();

    let mut map = tplc::LineMap::new("unit.gen");
    map.add_line(5, "Home.tmpl", 1, 2, 1);
    tplc::table::write_table_file(&map, &dir.path().join("unit.gen.dtab")).unwrap();

    let compiler = Compiler::new(config).unwrap();
    compiler.compile_batch(&["unit.gen".into()]).unwrap();

    let bytes = fs::read(dir.path().join("unit.o")).unwrap();
    let file = object::read::File::parse(&*bytes).unwrap();
    assert!(file.section_by_name(".debug_tplmap").is_some());
    assert!(
        file.symbols().any(|sym| sym.name() == Ok("_unit__gen")),
        "merge must not strip the artifact's linkage symbol"
    );
}

#[cfg(unix)]
#[test]
fn external_tool_runs_with_the_documented_argument_shape() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();

    // A stand-in compiler that records its argv and emits the artifact.
    let tool = dir.path().join("fakecc");
    fs::write(
        &tool,
        "#!/bin/sh\necho \"$@\" > argv.txt\ntouch unit.o\necho artifact > unit.o\n",
    )
    .unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = test_config(&dir);
    config.backend = tool.display().to_string();
    fs::write(dir.path().join("unit.gen"), "let x = 1;\n").unwrap();

    let compiler = Compiler::new(config).unwrap();
    compiler.compile_batch(&["unit.gen".into()]).unwrap();

    let argv = fs::read_to_string(dir.path().join("argv.txt")).unwrap();
    assert!(argv.contains("-d "), "{argv}");
    assert!(argv.contains("-I "), "{argv}");
    assert!(argv.trim_end().ends_with("unit.gen"), "{argv}");
}
