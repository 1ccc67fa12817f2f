//! Debug-table read path.

use std::collections::HashMap;

use super::HEADER_TOKEN;
use crate::error::TableError;
use crate::line_map::LineMap;

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Files,
    Lines,
    Unknown,
}

/// Parse a serialized table back into a [`LineMap`].
///
/// Only sections belonging to `stratum` (or the table's default stratum when
/// `None`) are honored, which lets multiple logical mappings coexist in one
/// table. Unknown `*X` markers are skipped to the next marker, and malformed
/// file or line entries are dropped individually; a malformed header fails
/// the whole parse.
pub fn parse_table(text: &str, stratum: Option<&str>) -> Result<LineMap, TableError> {
    let mut lines = text.lines().enumerate();

    let header = lines.next();
    match header {
        Some((_, line)) if line.trim_end() == HEADER_TOKEN => {}
        _ => return Err(TableError::BadHeader { line: 1 }),
    }

    let artifact = match lines.next() {
        Some((_, line)) if !line.trim().is_empty() => line.trim().to_string(),
        _ => return Err(TableError::BadHeader { line: 2 }),
    };
    let default_stratum = match lines.next() {
        Some((_, line)) if !line.trim().is_empty() => line.trim().to_string(),
        _ => return Err(TableError::BadHeader { line: 3 }),
    };

    let target = stratum.unwrap_or(&default_stratum).to_string();
    let mut map = LineMap::new(artifact).with_source_type(target.clone());

    let mut current_stratum = default_stratum;
    let mut section = Section::None;
    let mut files: HashMap<u32, String> = HashMap::new();
    let mut default_file: Option<u32> = None;
    // Two-line "+" file entries carry their path on the following line.
    let mut pending_file: Option<u32> = None;
    let mut last_file_id: Option<u32> = None;

    for (index, raw) in lines {
        let line = raw.trim_end();

        if let Some(rest) = line.strip_prefix("*S ") {
            current_stratum = rest.trim().to_string();
            section = Section::None;
            pending_file = None;
            continue;
        }
        if line == "*E" {
            break;
        }
        if line.starts_with('*') {
            section = match line {
                "*F" => Section::Files,
                "*L" => Section::Lines,
                _ => Section::Unknown,
            };
            pending_file = None;
            continue;
        }

        if current_stratum != target || section == Section::Unknown {
            continue;
        }

        match section {
            Section::Files => {
                if let Some(id) = pending_file.take() {
                    files.insert(id, line.to_string());
                    default_file.get_or_insert(id);
                    continue;
                }

                if let Some(rest) = line.strip_prefix("+ ") {
                    let mut parts = rest.splitn(2, ' ');
                    match parts.next().and_then(|id| id.parse::<u32>().ok()) {
                        Some(id) if parts.next().is_some() => pending_file = Some(id),
                        _ => log::debug!("skipping malformed file entry at line {}", index + 1),
                    }
                    continue;
                }

                let mut parts = line.splitn(2, ' ');
                match (
                    parts.next().and_then(|id| id.parse::<u32>().ok()),
                    parts.next(),
                ) {
                    (Some(id), Some(name)) if !name.trim().is_empty() => {
                        files.insert(id, name.trim().to_string());
                        default_file.get_or_insert(id);
                    }
                    _ => log::debug!("skipping malformed file entry at line {}", index + 1),
                }
            }
            Section::Lines => {
                let Some(entry) = parse_line_entry(line) else {
                    log::debug!("skipping malformed line entry at line {}", index + 1);
                    continue;
                };

                let file_id = entry.file_id.or(last_file_id).or(default_file);
                let Some(name) = file_id.and_then(|id| files.get(&id)) else {
                    log::debug!(
                        "skipping line entry at line {} with unresolved file id",
                        index + 1
                    );
                    continue;
                };

                if entry.file_id.is_some() {
                    last_file_id = entry.file_id;
                }

                map.add_line(
                    entry.source_line,
                    name,
                    entry.repeat_count,
                    entry.dest_line,
                    entry.dest_increment,
                );
            }
            Section::None | Section::Unknown => {}
        }
    }

    Ok(map)
}

struct RawEntry {
    source_line: u32,
    file_id: Option<u32>,
    repeat_count: u32,
    dest_line: u32,
    dest_increment: u32,
}

// srcLine['#'fileId[','repeatCount]]':'destLine[',' destIncrement]
fn parse_line_entry(line: &str) -> Option<RawEntry> {
    let (left, right) = line.split_once(':')?;

    let (dest_line, dest_increment) = match right.split_once(',') {
        Some((dest, inc)) => (dest.trim().parse().ok()?, inc.trim().parse().ok()?),
        None => (right.trim().parse().ok()?, 1),
    };

    let (src, file_id, repeat_count) = match left.split_once('#') {
        Some((src, id_part)) => {
            let (id, repeat) = match id_part.split_once(',') {
                Some((id, repeat)) => (id.trim().parse().ok()?, repeat.trim().parse().ok()?),
                None => (id_part.trim().parse().ok()?, 1),
            };
            (src, Some(id), repeat)
        }
        None => (left, None, 1),
    };

    Some(RawEntry {
        source_line: src.trim().parse().ok()?,
        file_id,
        repeat_count,
        dest_line,
        dest_increment,
    })
}
