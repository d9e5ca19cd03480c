//! Content normalization: line-ending conversion and whitespace-to-tab conversion.
//!
//! Line endings are fixed before tabs are inserted so that `\r`-delimited rows are split
//! first. Content recognized as binary passes through untouched regardless of options.

use serde::{Deserialize, Serialize};

use crate::sniff::looks_binary;

/// Tri-state `to_posix_lines` directive. Unspecified behaves like `Enabled`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosixLines {
    #[default]
    Default,
    Enabled,
    Disabled,
}

impl PosixLines {
    pub fn is_enabled(self) -> bool {
        !matches!(self, PosixLines::Disabled)
    }
}

/// Per-part normalization directives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    pub to_posix_lines: PosixLines,
    pub space_to_tab: bool,
}

impl NormalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posix_lines(mut self, to_posix_lines: PosixLines) -> Self {
        self.to_posix_lines = to_posix_lines;
        self
    }

    pub fn with_space_to_tab(mut self, space_to_tab: bool) -> Self {
        self.space_to_tab = space_to_tab;
        self
    }
}

/// What a normalization pass actually did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Content was recognized as binary and left untouched.
    pub binary: bool,
    /// Number of `\r\n` or lone `\r` terminators rewritten to `\n`.
    pub newlines_converted: usize,
    /// Number of lines whose separators were rewritten to tabs.
    pub lines_retabbed: usize,
}

/// Normalizes `content` according to `options`.
pub fn normalize(content: &[u8], options: NormalizeOptions) -> Vec<u8> {
    normalize_with_report(content, options).0
}

/// Like [normalize] but also reports what changed.
pub fn normalize_with_report(
    content: &[u8],
    options: NormalizeOptions,
) -> (Vec<u8>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    if looks_binary(content) {
        report.binary = true;
        return (content.to_vec(), report);
    }

    let mut out = if options.to_posix_lines.is_enabled() {
        let (converted, count) = to_posix_lines(content);
        report.newlines_converted = count;
        converted
    } else {
        content.to_vec()
    };

    if options.space_to_tab {
        let (converted, count) = space_to_tab(&out);
        report.lines_retabbed = count;
        out = converted;
    }
    (out, report)
}

fn to_posix_lines(content: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(content.len());
    let mut converted = 0;
    let mut bytes = content.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' {
            if bytes.peek() == Some(&b'\n') {
                bytes.next();
            }
            out.push(b'\n');
            converted += 1;
        } else {
            out.push(byte);
        }
    }
    (out, converted)
}

fn is_separator(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Collapses each run of spaces/tabs inside a line into one tab. Trailing separators are
/// dropped rather than turned into a tab, so a line never gains an empty last column.
/// Line terminators (including a `\r` left in place when posix conversion is off) are
/// preserved, so the line count never changes.
fn space_to_tab(content: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(content.len());
    let mut retabbed = 0;
    for line in content.split_inclusive(|b| *b == b'\n') {
        let terminator_len = if line.ends_with(b"\r\n") {
            2
        } else if line.ends_with(b"\n") {
            1
        } else {
            0
        };
        let (body, terminator) = line.split_at(line.len() - terminator_len);
        let mut end = body.len();
        while end > 0 && is_separator(body[end - 1]) {
            end -= 1;
        }
        let trimmed = &body[..end];

        let mut rewritten = Vec::with_capacity(trimmed.len());
        let mut in_run = false;
        for &byte in trimmed {
            if is_separator(byte) {
                if !in_run {
                    rewritten.push(b'\t');
                    in_run = true;
                }
            } else {
                rewritten.push(byte);
                in_run = false;
            }
        }
        if rewritten != body {
            retabbed += 1;
        }
        out.extend_from_slice(&rewritten);
        out.extend_from_slice(terminator);
    }
    (out, retabbed)
}
