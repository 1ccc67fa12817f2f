use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};

use tplc::line_map::LineMap;
use tplc::remap::{ArtifactResolver, Frame, StackTraceRemapper};
use tplc::table::{merge_debug_table, write_table};

struct MapResolver {
    units: HashMap<String, PathBuf>,
}

impl ArtifactResolver for MapResolver {
    fn artifact_for(&self, unit: &str) -> Option<PathBuf> {
        self.units.get(unit).cloned()
    }
}

fn write_artifact_with_table(dir: &Path, name: &str, map: &LineMap) -> PathBuf {
    let artifact = dir.join(name);
    let mut out = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = out.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    out.append_section_data(text, &[0xc3], 1);
    fs::write(&artifact, out.write().unwrap()).unwrap();

    let table = dir.join(format!("{name}.dtab"));
    fs::write(&table, write_table(map)).unwrap();
    merge_debug_table(&artifact, &table);
    artifact
}

fn home_map() -> LineMap {
    let mut map = LineMap::new("views/home.gen");
    map.add_line(4, "views/home.tmpl", 1, 40, 1);
    map.add_line(9, "views/home.tmpl", 5, 50, 1);
    map
}

#[test]
fn frames_translate_through_the_embedded_table() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact_with_table(dir.path(), "home.o", &home_map());

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.home".to_string(), artifact)]),
    }));

    let frame = Frame {
        unit: "views.home".into(),
        file: "views/home.gen".into(),
        line: 52,
    };
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home (views/home.tmpl:11)"
    );
}

#[test]
fn unmapped_lines_fall_back_to_the_default_form() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact_with_table(dir.path(), "home.o", &home_map());

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.home".to_string(), artifact)]),
    }));

    let frame = Frame {
        unit: "views.home".into(),
        file: "views/home.gen".into(),
        line: 999,
    };
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home (views/home.gen:999)"
    );
}

#[test]
fn inner_units_fall_back_to_their_parent_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact_with_table(dir.path(), "home.o", &home_map());

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.home".to_string(), artifact)]),
    }));

    // The inner unit keeps its own name in the rendered frame.
    let frame = Frame {
        unit: "views.home$closure1".into(),
        file: "views/home.gen".into(),
        line: 40,
    };
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home$closure1 (views/home.tmpl:4)"
    );
}

#[test]
fn artifacts_without_a_table_degrade_gracefully() {
    let dir = tempfile::tempdir().unwrap();

    let artifact = dir.path().join("bare.o");
    let mut out = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = out.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    out.append_section_data(text, &[0xc3], 1);
    fs::write(&artifact, out.write().unwrap()).unwrap();

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.bare".to_string(), artifact)]),
    }));

    let frame = Frame {
        unit: "views.bare".into(),
        file: "views/bare.gen".into(),
        line: 7,
    };
    assert_eq!(remapper.remap_frame(&frame), "views.bare (views/bare.gen:7)");
}

#[test]
fn corrupt_artifacts_degrade_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("broken.o");
    fs::write(&artifact, b"not an object file").unwrap();

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.broken".to_string(), artifact)]),
    }));

    let frame = Frame {
        unit: "views.broken".into(),
        file: "views/broken.gen".into(),
        line: 3,
    };
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.broken (views/broken.gen:3)"
    );
}

#[test]
fn invalidation_picks_up_a_rewritten_table() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact_with_table(dir.path(), "home.o", &home_map());

    let remapper = StackTraceRemapper::new(Box::new(MapResolver {
        units: HashMap::from([("views.home".to_string(), artifact.clone())]),
    }));

    let frame = Frame {
        unit: "views.home".into(),
        file: "views/home.gen".into(),
        line: 40,
    };
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home (views/home.tmpl:4)"
    );

    // Recompile moves the mapping; the cache only notices after an
    // explicit invalidate.
    let mut moved = LineMap::new("views/home.gen");
    moved.add_line(8, "views/home.tmpl", 1, 40, 1);
    let table = dir.path().join("home.o.dtab");
    fs::write(&table, write_table(&moved)).unwrap();
    merge_debug_table(&artifact, &table);

    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home (views/home.tmpl:4)"
    );
    remapper.invalidate("views.home");
    assert_eq!(
        remapper.remap_frame(&frame),
        "views.home (views/home.tmpl:8)"
    );
}
