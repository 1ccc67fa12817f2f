//! Debug-table write path.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use super::HEADER_TOKEN;
use crate::line_map::LineMap;

/// Serialize a line map to the text table format.
///
/// File ids are assigned in first-seen entry order, starting at 1; the first
/// file doubles as the unkeyed default on the read side. A line entry omits
/// its `#fileId,repeatCount` part when the file is unchanged and the repeat
/// count is 1, and omits `,destIncrement` when the increment is 1.
pub fn write_table(map: &LineMap) -> String {
    let mut out = String::new();

    writeln!(out, "{HEADER_TOKEN}").ok();
    writeln!(out, "{}", map.dest_filename()).ok();
    writeln!(out, "{}", map.source_type()).ok();
    writeln!(out, "*S {}", map.source_type()).ok();

    writeln!(out, "*F").ok();
    let mut file_ids: HashMap<&str, u32> = HashMap::new();
    for entry in map.iter() {
        let name = &**entry.source_filename();
        if file_ids.contains_key(name) {
            continue;
        }
        let id = file_ids.len() as u32 + 1;
        file_ids.insert(name, id);

        match name.rfind('/') {
            // Path-qualified names use the two-line form: short display name
            // first, full path on the following line.
            Some(slash) => {
                writeln!(out, "+ {} {}", id, &name[slash + 1..]).ok();
                writeln!(out, "{name}").ok();
            }
            None => {
                writeln!(out, "{id} {name}").ok();
            }
        }
    }

    writeln!(out, "*L").ok();
    let mut last_id = 1;
    for entry in map.iter() {
        let id = file_ids[&**entry.source_filename()];

        write!(out, "{}", entry.source_line()).ok();
        if id != last_id || entry.repeat_count() != 1 {
            write!(out, "#{id}").ok();
            if entry.repeat_count() != 1 {
                write!(out, ",{}", entry.repeat_count()).ok();
            }
            last_id = id;
        }
        write!(out, ":{}", entry.dest_line()).ok();
        if entry.dest_increment() != 1 {
            write!(out, ",{}", entry.dest_increment()).ok();
        }
        writeln!(out).ok();
    }

    writeln!(out, "*E").ok();
    out
}

/// Serialize a line map to the side-car table file at `path`.
pub fn write_table_file(map: &LineMap, path: &Path) -> io::Result<()> {
    fs::write(path, write_table(map))
}
