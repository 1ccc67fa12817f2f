//! Scanner for the `file:line: message` dialect.
//!
//! This is the dialect emitted by the internal backends and by the default
//! external tools. Diagnostic lines are translated through the line map;
//! the source-context and caret lines that follow a diagnostic are passed
//! through untouched, and anything before the first diagnostic is dropped.

use super::DiagnosticParser;
use crate::line_map::LineMap;

pub struct TaggedDiagnosticParser;

impl DiagnosticParser for TaggedDiagnosticParser {
    fn parse_errors(&self, raw: &[u8], line_map: Option<&LineMap>) -> String {
        let text = String::from_utf8_lossy(raw);
        let mut out = String::new();
        let mut in_context = false;

        for line in text.lines() {
            match split_diagnostic(line) {
                Some((file, number, message)) => {
                    let formatted = match line_map {
                        Some(map) => map.convert_error(file, number, 0, message),
                        None => format!("{file}:{number}: {message}"),
                    };
                    out.push_str(&formatted);
                    out.push('\n');
                    in_context = true;
                }
                None if in_context => {
                    if line.trim().is_empty() {
                        in_context = false;
                    } else {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                None => {}
            }
        }

        out
    }
}

/// Split `file:line: message`, taking the first all-digit colon-delimited
/// field as the line number so drive-letter style paths survive.
fn split_diagnostic(line: &str) -> Option<(&str, u32, &str)> {
    let mut search = 0;

    while let Some(rel) = line[search..].find(':') {
        let colon = search + rel;
        let rest = &line[colon + 1..];

        let Some(end) = rest.find(':') else {
            return None;
        };

        let field = &rest[..end];
        if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = field.parse() {
                return Some((&line[..colon], number, rest[end + 1..].trim_start()));
            }
        }

        search = colon + 1;
    }

    None
}
