// This module translates runtime stack frames that point into generated units back
// to the template positions they came from. Line maps are recovered from the
// .debug_tplmap section of each unit's artifact and cached, with negative results
// cached too so a unit without debug info costs one lookup, not one per frame. When a
// unit has no artifact of its own the remapper derives a parent unit id by stripping
// the last `$`- or `.`-delimited segment and retries once, which covers inner units
// compiled into their parent's artifact. Remapping is strictly best-effort: every
// failure degrades to the frame's default form and is at most logged.

//! Stack-trace remapping through embedded debug tables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::line_map::LineMap;
use crate::table::merge::extract_table;
use crate::table::parser::parse_table;

/// Locates the compiled artifact for a unit name.
pub trait ArtifactResolver: Send + Sync {
    fn artifact_for(&self, unit: &str) -> Option<PathBuf>;
}

/// One stack frame pointing into a generated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unit: String,
    pub file: String,
    pub line: u32,
}

impl Frame {
    /// The untranslated rendering, used whenever remapping fails.
    pub fn default_form(&self) -> String {
        format!("{} ({}:{})", self.unit, self.file, self.line)
    }
}

type CacheEntry = Option<Arc<LineMap>>;

pub struct StackTraceRemapper {
    resolver: Box<dyn ArtifactResolver>,
    stratum: Option<String>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl StackTraceRemapper {
    pub fn new(resolver: Box<dyn ArtifactResolver>) -> Self {
        Self {
            resolver,
            stratum: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Restrict table parsing to one stratum; by default the table's own
    /// default stratum applies.
    pub fn with_stratum(mut self, stratum: impl Into<String>) -> Self {
        self.stratum = Some(stratum.into());
        self
    }

    /// Render `frame` with its position translated back to the template,
    /// or in its default form when no mapping is available.
    pub fn remap_frame(&self, frame: &Frame) -> String {
        let map = match self.line_map_for(&frame.unit) {
            Some(map) => map,
            None => match parent_unit(&frame.unit) {
                Some(parent) => match self.line_map_for(parent) {
                    Some(map) => map,
                    None => return frame.default_form(),
                },
                None => return frame.default_form(),
            },
        };

        match map.get_line(frame.line) {
            Some(mapped) => format!(
                "{} ({}:{})",
                frame.unit, mapped.source_filename, mapped.source_line
            ),
            None => frame.default_form(),
        }
    }

    /// Drop the cached table for one unit, e.g. after a recompile.
    pub fn invalidate(&self, unit: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(unit);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn line_map_for(&self, unit: &str) -> CacheEntry {
        if let Ok(cache) = self.cache.lock() {
            if let Some(entry) = cache.get(unit) {
                return entry.clone();
            }
        }

        let loaded = self.load(unit);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(unit.to_string(), loaded.clone());
        }
        loaded
    }

    fn load(&self, unit: &str) -> CacheEntry {
        let artifact = self.resolver.artifact_for(unit)?;

        let bytes = match extract_table(&artifact) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                log::debug!("no debug table for {unit}: {err}");
                return None;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        match parse_table(&text, self.stratum.as_deref()) {
            Ok(map) => Some(Arc::new(map)),
            Err(err) => {
                log::debug!("unreadable debug table for {unit}: {err}");
                None
            }
        }
    }
}

// `views.foo$inner` and `views.foo.inner` both fall back to `views.foo`.
fn parent_unit(unit: &str) -> Option<&str> {
    let cut = unit.rfind(['$', '.'])?;
    if cut == 0 {
        return None;
    }
    Some(&unit[..cut])
}
