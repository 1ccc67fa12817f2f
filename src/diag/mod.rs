// This module turns a backend's raw diagnostic byte stream into structured,
// logically-positioned error text. Each backend dialect has its own scanner, but all
// share one output contract: per diagnostic, either the LineMap-translated
// `file:line: message` plus any pointer/caret context, or the raw form when
// translation is unavailable. Scanners must tolerate arbitrary tool output without
// panicking and produce an empty string for empty input.

//! Dialect-specific diagnostic scanners.

pub mod banner;
pub mod tagged;

pub use banner::BannerDiagnosticParser;
pub use tagged::TaggedDiagnosticParser;

use crate::line_map::LineMap;

/// Shared contract for diagnostic scanners.
pub trait DiagnosticParser {
    /// Convert raw tool output into one combined diagnostic string,
    /// translating positions through `line_map` when available.
    fn parse_errors(&self, raw: &[u8], line_map: Option<&LineMap>) -> String;
}

/// Pick the scanner for an external tool by name.
pub fn parser_for_tool(tool: &str) -> Box<dyn DiagnosticParser + Send + Sync> {
    if tool.ends_with("-legacy") {
        Box::new(BannerDiagnosticParser)
    } else {
        Box::new(TaggedDiagnosticParser)
    }
}

/// Expand tabs to the next multiple of 8 columns.
pub(crate) fn expand_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut col = 0usize;

    for ch in text.chars() {
        if ch == '\t' {
            let next = (col / 8 + 1) * 8;
            while col < next {
                out.push(' ');
                col += 1;
            }
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}
