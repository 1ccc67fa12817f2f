// This module implements LineMap, the in-memory table mapping generated-source lines
// back to the original authored-template positions. A LineMap holds an ordered list of
// range entries, each covering repeat_count original lines starting at source_line,
// laid out from dest_line with dest_increment generated lines per original line.
// Queries walk the entries linearly, so a map stays queryable even when a caller
// violates the documented append-in-destination-order contract. convert_error rewrites
// a raw diagnostic position into original-template terms when a mapping exists and
// otherwise passes the raw position through unchanged.

//! Generated-line to original-position mapping.

use std::path::Path;
use std::sync::Arc;

/// One mapped range.
///
/// Covers the destination lines `[dest_line, dest_line + repeat_count *
/// dest_increment)`, stepping `dest_increment` generated lines per original
/// line starting at `source_line`.
#[derive(Debug, Clone)]
pub struct LineEntry {
    source_filename: Arc<str>,
    source_line: u32,
    repeat_count: u32,
    dest_line: u32,
    dest_increment: u32,
}

impl LineEntry {
    pub fn source_filename(&self) -> &Arc<str> {
        &self.source_filename
    }

    pub fn source_line(&self) -> u32 {
        self.source_line
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn dest_line(&self) -> u32 {
        self.dest_line
    }

    pub fn dest_increment(&self) -> u32 {
        self.dest_increment
    }

    fn contains(&self, dest: u32) -> bool {
        let span = u64::from(self.repeat_count) * u64::from(self.dest_increment);
        u64::from(dest) >= u64::from(self.dest_line)
            && u64::from(dest) < u64::from(self.dest_line) + span
    }
}

/// A resolved original position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLine {
    pub source_filename: Arc<str>,
    pub source_line: u32,
}

/// Mapping from generated lines back to the original template positions.
///
/// Entries are expected to be appended in non-decreasing `dest_line` order.
/// That is a caller contract rather than an enforced invariant: out-of-order
/// appends are accepted with a warning, and lookups stay correct because
/// [`LineMap::get_line`] scans all entries.
#[derive(Debug, Clone)]
pub struct LineMap {
    dest_filename: String,
    source_type: String,
    prefer_last: bool,
    entries: Vec<LineEntry>,
}

/// Default stratum label when the originating template language is unnamed.
pub const DEFAULT_SOURCE_TYPE: &str = "template";

impl LineMap {
    /// Create a map for the named generated source file.
    pub fn new(dest_filename: impl Into<String>) -> Self {
        Self {
            dest_filename: dest_filename.into(),
            source_type: DEFAULT_SOURCE_TYPE.to_string(),
            prefer_last: false,
            entries: Vec::new(),
        }
    }

    /// Set the stratum label, e.g. the name of the template language.
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    /// When two registrations cover the same destination line, should the
    /// later one win?
    pub fn set_prefer_last(&mut self, prefer_last: bool) {
        self.prefer_last = prefer_last;
    }

    pub fn dest_filename(&self) -> &str {
        &self.dest_filename
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn prefer_last(&self) -> bool {
        self.prefer_last
    }

    /// Append a mapping entry.
    ///
    /// `repeat_count` and `dest_increment` of zero are caller programming
    /// errors; they are clamped to 1 and logged rather than failing, so a
    /// sloppy generator degrades the mapping instead of the compile.
    pub fn add_line(
        &mut self,
        source_line: u32,
        source_filename: &str,
        repeat_count: u32,
        dest_line: u32,
        dest_increment: u32,
    ) {
        if repeat_count == 0 || dest_increment == 0 {
            log::debug!(
                "line map entry for {source_filename}:{source_line} has zero \
                 repeat or increment; clamping to 1"
            );
        }

        if let Some(last) = self.entries.last() {
            if dest_line < last.dest_line {
                log::warn!(
                    "line map entry for destination line {dest_line} registered \
                     after line {}; lookups remain valid but the serialized \
                     table will not be sorted",
                    last.dest_line
                );
            }
        }

        let source_filename = match self
            .entries
            .iter()
            .rev()
            .find(|e| &*e.source_filename == source_filename)
        {
            Some(e) => Arc::clone(&e.source_filename),
            None => Arc::from(source_filename),
        };

        self.entries.push(LineEntry {
            source_filename,
            source_line,
            repeat_count: repeat_count.max(1),
            dest_line,
            dest_increment: dest_increment.max(1),
        });
    }

    /// Resolve a generated line to its original position, or `None` when no
    /// entry covers it.
    pub fn get_line(&self, dest_line: u32) -> Option<MappedLine> {
        let hit = if self.prefer_last {
            self.entries.iter().rev().find(|e| e.contains(dest_line))
        } else {
            self.entries.iter().find(|e| e.contains(dest_line))
        }?;

        let step = (dest_line - hit.dest_line) / hit.dest_increment;
        Some(MappedLine {
            source_filename: Arc::clone(&hit.source_filename),
            source_line: hit.source_line + step,
        })
    }

    /// Format a diagnostic, translated to the original position when the
    /// reported file is this map's generated source and the line is covered.
    /// Untranslatable diagnostics pass through unchanged.
    pub fn convert_error(&self, file: &str, line: u32, _column: u32, message: &str) -> String {
        if self.matches_dest(file) {
            if let Some(mapped) = self.get_line(line) {
                return format!("{}:{}: {}", mapped.source_filename, mapped.source_line, message);
            }
        }

        format!("{file}:{line}: {message}")
    }

    // The backend may report the generated file with an absolute or
    // tool-relative path; compare by file name.
    fn matches_dest(&self, file: &str) -> bool {
        if self.dest_filename.is_empty() || file == self.dest_filename {
            return true;
        }

        match (
            Path::new(file).file_name(),
            Path::new(&self.dest_filename).file_name(),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// The source filename of the most recently registered entry, used by
    /// downstream table generation.
    pub fn last_source_filename(&self) -> Option<&Arc<str>> {
        self.entries.last().map(|e| e.source_filename())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LineEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineEntry> {
        self.entries.iter()
    }
}
