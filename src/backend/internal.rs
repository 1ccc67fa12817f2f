// This module implements the in-process backends. An internal backend reads each
// generated source, honors the `//@ file:line` position directives the upstream
// codegen layer leaves behind (each directive annotates the line that follows it,
// feeding the line-map sink), and packages the unit into an ELF relocatable object
// with the payload in a .tplc.gen section. Two artifact-format revisions exist: V2
// additionally records a .comment section and a symbol named after the mangled unit.
// Artifacts are written to a temp file and renamed into place so a failed compile
// never leaves something that parses as a valid object.

//! In-process compile backends.

use std::fs;
use std::sync::MutexGuard;

use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

use super::{Backend, CompileJob, LineMapSink};
use crate::compiler::mangle_name;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::line_map::LineMap;

/// Artifact-format revision of the internal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRevision {
    V1,
    V2,
}

pub struct InternalBackend {
    config: CompilerConfig,
    revision: ArtifactRevision,
}

impl InternalBackend {
    pub fn new(config: CompilerConfig, revision: ArtifactRevision) -> Self {
        Self { config, revision }
    }

    fn compile_one(&self, path: &str, sink: Option<&LineMapSink>) -> CompileResult<()> {
        let source_path = self.config.source_dir.join(path);
        let bytes = fs::read(&source_path)?;

        // Non-UTF-8 encodings degrade to lossy conversion; the payload keeps
        // the original bytes either way.
        let text = String::from_utf8_lossy(&bytes);

        let mut map = LineMap::new(path);
        let mut failure: Option<String> = None;

        if text.trim().is_empty() {
            failure = Some(map.convert_error(path, 1, 0, "error: empty generated source"));
        } else {
            for (index, line) in text.lines().enumerate() {
                let Some(directive) = line.trim_start().strip_prefix("//@ ") else {
                    continue;
                };
                match parse_directive(directive) {
                    Some((file, line_number)) => {
                        map.add_line(line_number, file, 1, index as u32 + 2, 1);
                    }
                    None => {
                        failure = Some(map.convert_error(
                            path,
                            index as u32 + 1,
                            0,
                            "error: malformed position directive",
                        ));
                        break;
                    }
                }
            }
        }

        if let Some(sink) = sink {
            merge_into_sink(sink, &map);
        }

        if let Some(text) = failure {
            return Err(CompileError::Diagnostics { text });
        }

        self.write_artifact(path, &bytes)
    }

    fn write_artifact(&self, path: &str, payload: &[u8]) -> CompileResult<()> {
        let artifact = self.config.artifact_path(path);
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = Object::new(
            BinaryFormat::Elf,
            Architecture::X86_64,
            Endianness::Little,
        );

        let section = out.add_section(
            Vec::new(),
            b".tplc.gen".to_vec(),
            SectionKind::ReadOnlyData,
        );
        out.append_section_data(section, payload, 1);

        if self.revision == ArtifactRevision::V2 {
            let comment = out.add_section(Vec::new(), b".comment".to_vec(), SectionKind::Note);
            out.append_section_data(comment, b"tplc internal2\0", 1);

            out.add_symbol(Symbol {
                name: mangle_name(path).into_bytes(),
                value: 0,
                size: payload.len() as u64,
                kind: SymbolKind::Data,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(section),
                flags: SymbolFlags::None,
            });
        }

        let bytes = out
            .write()
            .map_err(|err| CompileError::Internal(format!("artifact emit failed: {err}")))?;

        // Write-then-rename so a failure never leaves a parseable artifact.
        let staging = artifact.with_extension("o.tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &artifact)?;
        Ok(())
    }
}

impl Backend for InternalBackend {
    fn name(&self) -> &str {
        match self.revision {
            ArtifactRevision::V1 => "internal",
            ArtifactRevision::V2 => "internal2",
        }
    }

    fn run(&self, job: &CompileJob) -> CompileResult<()> {
        for path in &job.paths {
            self.compile_one(path, job.line_map.as_ref())?;
        }
        Ok(())
    }

    // An in-process transform cannot be safely interrupted.
    fn abort(&self) {}
}

// `//@ Foo.tmpl:17` annotates the line that follows the directive.
fn parse_directive(directive: &str) -> Option<(&str, u32)> {
    let (file, line) = directive.trim().rsplit_once(':')?;
    if file.is_empty() {
        return None;
    }
    Some((file, line.trim().parse().ok()?))
}

fn merge_into_sink(sink: &LineMapSink, map: &LineMap) {
    let mut guard: MutexGuard<'_, LineMap> = match sink.lock() {
        Ok(guard) => guard,
        Err(_) => {
            log::warn!("line map sink poisoned; dropping {} entries", map.len());
            return;
        }
    };
    for entry in map.iter() {
        guard.add_line(
            entry.source_line(),
            entry.source_filename(),
            entry.repeat_count(),
            entry.dest_line(),
            entry.dest_increment(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fixture(source: &str) -> (tempfile::TempDir, CompilerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = CompilerConfig {
            source_dir: dir.path().to_path_buf(),
            artifact_dir: dir.path().to_path_buf(),
            ..CompilerConfig::default()
        };
        fs::write(dir.path().join("unit.gen"), source).unwrap();
        (dir, config)
    }

    fn job_with_sink() -> (CompileJob, LineMapSink) {
        let sink: LineMapSink = Arc::new(Mutex::new(LineMap::new("unit.gen")));
        (
            CompileJob {
                paths: vec!["unit.gen".into()],
                line_map: Some(Arc::clone(&sink)),
            },
            sink,
        )
    }

    #[test]
    fn writes_a_parseable_artifact() {
        let (dir, config) = fixture("//@ Foo.tmpl:3\nlet x = 1;\n");
        let backend = InternalBackend::new(config, ArtifactRevision::V1);
        let (job, _) = job_with_sink();

        backend.run(&job).unwrap();

        let data = fs::read(dir.path().join("unit.o")).unwrap();
        let file = object::read::File::parse(&*data).unwrap();
        use object::{Object as _, ObjectSection as _};
        let section = file.section_by_name(".tplc.gen").unwrap();
        assert!(section.data().unwrap().starts_with(b"//@ Foo.tmpl:3"));
    }

    #[test]
    fn v2_records_comment_and_symbol() {
        let (dir, config) = fixture("//@ Foo.tmpl:3\nlet x = 1;\n");
        let backend = InternalBackend::new(config, ArtifactRevision::V2);
        let (job, _) = job_with_sink();

        backend.run(&job).unwrap();

        let data = fs::read(dir.path().join("unit.o")).unwrap();
        let file = object::read::File::parse(&*data).unwrap();
        use object::{Object as _, ObjectSection as _};
        assert!(file.section_by_name(".comment").is_some());
        assert!(file.symbols().next().is_some());
    }

    #[test]
    fn directives_populate_the_sink() {
        let (_dir, config) = fixture("//@ Foo.tmpl:3\nlet x = 1;\n//@ Foo.tmpl:9\nlet y = 2;\n");
        let backend = InternalBackend::new(config, ArtifactRevision::V1);
        let (job, sink) = job_with_sink();

        backend.run(&job).unwrap();

        let map = sink.lock().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_line(2).unwrap().source_line, 3);
        assert_eq!(map.get_line(4).unwrap().source_line, 9);
    }

    #[test]
    fn empty_source_is_a_diagnostic_not_an_artifact() {
        let (dir, config) = fixture("  \n");
        let backend = InternalBackend::new(config, ArtifactRevision::V1);
        let (job, _) = job_with_sink();

        let err = backend.run(&job).unwrap_err();
        assert!(matches!(err, CompileError::Diagnostics { .. }));
        assert!(!dir.path().join("unit.o").exists());
    }

    #[test]
    fn malformed_directive_reports_its_line() {
        let (_dir, config) = fixture("let a = 1;\n//@ nonsense\n");
        let backend = InternalBackend::new(config, ArtifactRevision::V1);
        let (job, _) = job_with_sink();

        match backend.run(&job).unwrap_err() {
            CompileError::Diagnostics { text } => {
                assert!(text.contains("unit.gen:2"), "{text}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompilerConfig {
            source_dir: dir.path().to_path_buf(),
            artifact_dir: dir.path().to_path_buf(),
            ..CompilerConfig::default()
        };
        let backend = InternalBackend::new(config, ArtifactRevision::V1);
        let (job, _) = job_with_sink();

        assert!(matches!(
            backend.run(&job).unwrap_err(),
            CompileError::Io(_)
        ));
    }
}
