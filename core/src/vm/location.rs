//! Source locations for diagnostics.

use core::fmt;

use crate::syntax::Pos;

/// Where in a template something went wrong.
///
/// `line` and `column` are only known when the template's source text was
/// supplied; otherwise only the byte offset is reported. Lines are 1-based and
/// do not count the prepended header line or preceding `{{define}}` headers;
/// columns are 0-based byte offsets within the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub template: String,
    pub offset: Pos,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Location {
    pub fn new(template: &str, offset: Pos, source: Option<&str>) -> Self {
        let prefix = source.and_then(|text| Some((text, text.get(..offset)?)));
        let (line, column) = match prefix {
            Some((text, before)) => {
                let (line, column) = line_column(text, offset);
                let defines = count_defines(before);
                (Some(line.saturating_sub(1 + defines).max(1)), Some(column))
            }
            _ => (None, None),
        };
        Self {
            template: template.to_string(),
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", self.template, line, column),
            _ => write!(f, "{}@{}", self.template, self.offset),
        }
    }
}

fn line_column(text: &str, offset: Pos) -> (usize, usize) {
    let before = &text.as_bytes()[..offset];
    let line = 1 + before.iter().filter(|&&b| b == b'\n').count();
    let column = match before.iter().rposition(|&b| b == b'\n') {
        Some(nl) => offset - nl - 1,
        None => offset,
    };
    (line, column)
}

/// Number of `{{define` headers (optionally trimmed, `{{- define`).
fn count_defines(text: &str) -> usize {
    let mut count = 0;
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let mut after = &rest[start + 2..];
        if let Some(trimmed) = after.strip_prefix('-') {
            after = trimmed;
        }
        if after.trim_start().starts_with("define") {
            count += 1;
        }
        rest = &rest[start + 2..];
    }
    count
}
