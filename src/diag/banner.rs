//! Scanner for the legacy banner dialect.
//!
//! The legacy tools interleave `***` banner lines with numbered source
//! context:
//!
//! ```text
//! *** Found 1 semantic error compiling "work/foo.gen":
//!
//!     12.         x = y;
//!                     ^
//! *** Semantic Error: y is undefined
//! ```
//!
//! A leading whitespace-and-digits run with a trailing `.` is a numbered
//! source-context line; the caret line that follows is re-indented so the
//! caret stays under the right column once the number prefix is stripped,
//! with tabs expanded to the next multiple of 8. `***` lines are a
//! filename-context update (quoted path after the token `Found`), a
//! suppressed pure-warning, or a pass-through summary. Anything else is
//! skipped to the next newline.

use super::{expand_tabs, DiagnosticParser};
use crate::line_map::LineMap;

pub struct BannerDiagnosticParser;

struct Context {
    line_number: u32,
    prefix_width: usize,
    source_text: String,
    caret: Option<(usize, String)>,
}

impl DiagnosticParser for BannerDiagnosticParser {
    fn parse_errors(&self, raw: &[u8], line_map: Option<&LineMap>) -> String {
        let text = String::from_utf8_lossy(raw);
        let mut out = String::new();
        let mut current_file = String::new();
        let mut pending: Option<Context> = None;

        for line in text.lines() {
            if let Some(banner) = line.strip_prefix("***") {
                let banner = banner.trim();

                if banner.contains("Found") {
                    if let Some(path) = quoted(banner) {
                        current_file = path.to_string();
                        continue;
                    }
                }

                if banner.starts_with("Warning") || banner.starts_with("Caution") {
                    pending = None;
                    continue;
                }

                match pending.take() {
                    Some(ctx) if !current_file.is_empty() => {
                        let column = ctx.caret.as_ref().map_or(0, |(col, _)| *col as u32);
                        let head = match line_map {
                            Some(map) => {
                                map.convert_error(&current_file, ctx.line_number, column, banner)
                            }
                            None => {
                                format!("{current_file}:{}: {banner}", ctx.line_number)
                            }
                        };
                        out.push_str(&head);
                        out.push('\n');
                        push_context(&mut out, &ctx);
                    }
                    other => {
                        if let Some(ctx) = other {
                            push_context(&mut out, &ctx);
                        }
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                continue;
            }

            if let Some((number, prefix_width, source_text)) = numbered_context(line) {
                if let Some(ctx) = pending.take() {
                    push_context(&mut out, &ctx);
                }
                pending = Some(Context {
                    line_number: number,
                    prefix_width,
                    source_text,
                    caret: None,
                });
                continue;
            }

            if let Some(ctx) = pending.as_mut() {
                if ctx.caret.is_none() {
                    if let Some((indent, glyphs)) = caret_line(line) {
                        // The raw caret aligns against the raw context line;
                        // shift left by the stripped number prefix.
                        ctx.caret = Some((indent.saturating_sub(ctx.prefix_width), glyphs));
                        continue;
                    }
                }
            }

            // Unrecognized line: skip to the next newline.
        }

        if let Some(ctx) = pending {
            push_context(&mut out, &ctx);
        }

        out
    }
}

fn push_context(out: &mut String, ctx: &Context) {
    out.push_str(&ctx.source_text);
    out.push('\n');
    if let Some((column, glyphs)) = &ctx.caret {
        for _ in 0..*column {
            out.push(' ');
        }
        out.push_str(glyphs);
        out.push('\n');
    }
}

/// Parse a `    12.   source text` context line: returns the line number,
/// the expanded width of the number prefix, and the tab-expanded source
/// text.
fn numbered_context(line: &str) -> Option<(u32, usize, String)> {
    let trimmed = line.trim_start();
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();

    if digits.is_empty() || !trimmed[digits.len()..].starts_with('.') {
        return None;
    }

    let number = digits.parse().ok()?;
    let indent = line.len() - trimmed.len();
    let prefix_len = indent + digits.len() + 1;
    // Expand against the full raw line so tab stops match the tool's own
    // layout, then drop the number prefix.
    let prefix_width = expand_tabs(&line[..prefix_len]).chars().count();
    let expanded = expand_tabs(line);
    let source_text = expanded.chars().skip(prefix_width).collect();

    Some((number, prefix_width, source_text))
}

/// A caret line is whitespace followed by `^` glyphs (dialects use runs of
/// `^` for multi-column spans). Returns the caret column relative to the
/// stripped number prefix, and the glyphs.
fn caret_line(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c == '^') {
        return None;
    }

    let indent = expand_tabs(&line[..line.len() - trimmed.len()]).len();
    Some((indent, trimmed.to_string()))
}

fn quoted(text: &str) -> Option<&str> {
    let start = text.find('"')? + 1;
    let end = start + text[start..].find('"')?;
    Some(&text[start..end])
}
