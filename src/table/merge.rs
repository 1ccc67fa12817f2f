//! Embedding tables into compiled artifacts.
//!
//! The merge step runs after a successful compile and must never fail it:
//! a missing or unmergeable table degrades diagnostics, nothing more.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use object::read::{Object as _, ObjectSection as _, ObjectSymbol as _, SymbolSection};
use object::{SectionKind, SymbolFlags, SymbolKind};

use super::{MAX_TABLE_SIZE, TABLE_SECTION};

/// Attach the side-car table at `table_path` to the artifact as an opaque
/// named section, rewriting the artifact in place.
///
/// Oversized tables and any I/O or envelope-parse failure are logged and
/// skipped.
pub fn merge_debug_table(artifact: &Path, table_path: &Path) {
    match fs::metadata(table_path) {
        Ok(meta) if meta.len() >= MAX_TABLE_SIZE => {
            log::warn!(
                "debug table for {} is too large ({} bytes); skipping merge",
                artifact.display(),
                meta.len()
            );
            return;
        }
        Ok(_) => {}
        Err(err) => {
            log::warn!(
                "cannot read debug table {}: {err}",
                table_path.display()
            );
            return;
        }
    }

    log::debug!("merging debug table into {}", artifact.display());

    if let Err(err) = try_merge(artifact, table_path) {
        log::warn!(
            "debug table merge for {} failed: {err}",
            artifact.display()
        );
    }
}

fn try_merge(artifact: &Path, table_path: &Path) -> Result<(), Box<dyn Error>> {
    let data = fs::read(artifact)?;
    let table = fs::read(table_path)?;

    let input = object::read::File::parse(&*data)?;
    let mut out = object::write::Object::new(
        input.format(),
        input.architecture(),
        input.endianness(),
    );

    let mut section_ids = HashMap::new();
    for section in input.sections() {
        // Symbol and string tables are rebuilt below, not copied raw.
        if section.kind() == SectionKind::Metadata {
            continue;
        }
        let name = section.name()?;
        if name.is_empty() || name == TABLE_SECTION {
            // Re-merging replaces any previously embedded table.
            continue;
        }

        let id = out.add_section(Vec::new(), name.as_bytes().to_vec(), section.kind());
        out.append_section_data(id, section.data()?, section.align().max(1));
        section_ids.insert(section.index(), id);
    }

    for symbol in input.symbols() {
        // Section and file symbols are generated fresh by the writer.
        if matches!(symbol.kind(), SymbolKind::Section | SymbolKind::File) {
            continue;
        }
        let name = symbol.name()?;
        if name.is_empty() {
            continue;
        }
        let section = match symbol.section() {
            SymbolSection::Section(index) => match section_ids.get(&index) {
                Some(id) => object::write::SymbolSection::Section(*id),
                None => continue,
            },
            SymbolSection::Undefined => object::write::SymbolSection::Undefined,
            SymbolSection::Absolute => object::write::SymbolSection::Absolute,
            SymbolSection::Common => object::write::SymbolSection::Common,
            _ => continue,
        };
        out.add_symbol(object::write::Symbol {
            name: name.as_bytes().to_vec(),
            value: symbol.address(),
            size: symbol.size(),
            kind: symbol.kind(),
            scope: symbol.scope(),
            weak: symbol.is_weak(),
            section,
            flags: SymbolFlags::None,
        });
    }

    let id = out.add_section(
        Vec::new(),
        TABLE_SECTION.as_bytes().to_vec(),
        SectionKind::Note,
    );
    out.append_section_data(id, &table, 1);

    fs::write(artifact, out.write()?)?;
    Ok(())
}

/// Read the embedded table bytes back out of an artifact, or `None` when the
/// artifact has no table section. Parse failures are errors for the caller
/// to degrade on.
pub fn extract_table(artifact: &Path) -> Result<Option<Vec<u8>>, Box<dyn Error>> {
    let data = fs::read(artifact)?;
    let input = object::read::File::parse(&*data)?;

    match input.section_by_name(TABLE_SECTION) {
        Some(section) => Ok(Some(section.data()?.to_vec())),
        None => Ok(None),
    }
}
