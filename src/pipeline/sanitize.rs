//! Post-processing: deterministic cleanup of model-generated CSV.
//!
//! Even with the prompt asking for bare CSV, models regularly wrap the answer
//! in ```` ```csv ```` fences, sometimes followed by a literal `\n` escape
//! instead of a real newline. The rules here remove those markers and nothing
//! else. Cell content is never rewritten, and line endings (including CR or
//! CRLF inside quoted cells) pass through as the model produced them.
//!
//! Rules (applied in order):
//! 1. Drop lines consisting only of a fence marker
//! 2. Strip fence markers glued to the first or last line of content
//! 3. Trim surrounding whitespace
//!
//! The reserved `#METADATA:` first line is kept in the output; use
//! [`parse_metadata`] to read it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of the reserved first line.
pub const METADATA_PREFIX: &str = "#METADATA:";

/// Clean raw model output into CSV text.
///
/// Returns an empty string when nothing but fences or whitespace was
/// produced; the caller treats that as an empty result.
pub fn sanitize(raw: &str) -> String {
    let s = drop_fence_lines(raw);
    let s = strip_glued_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Drop fence-only lines ────────────────────────────────────────────

// ``` or ```csv (any tag), optionally followed by a literal "\n" escape.
// Matched per segment including its terminator, so `\s*$` absorbs "\r\n".
static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z]*\s*(?:\\n)?\s*$").unwrap());

fn drop_fence_lines(input: &str) -> String {
    input
        .split_inclusive('\n')
        .filter(|segment| !RE_FENCE_LINE.is_match(segment))
        .collect()
}

// ── Rule 2: Strip fences glued to content ────────────────────────────────────

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```(?i:csv)?(?:\\n)?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\\n)?```\s*$").unwrap());

fn strip_glued_fences(input: &str) -> String {
    let trimmed = input.trim();
    let s = RE_LEADING_FENCE.replace(trimmed, "");
    RE_TRAILING_FENCE.replace(&s, "").into_owned()
}

// ── Metadata line ────────────────────────────────────────────────────────────

/// Collection date and station code from the `#METADATA:` line.
///
/// Either field may be empty when the document does not show it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// `YYYY-MM` as written by the model, or empty.
    pub collection_date: String,
    pub station_code: String,
}

impl CollectionMetadata {
    pub fn is_empty(&self) -> bool {
        self.collection_date.is_empty() && self.station_code.is_empty()
    }
}

/// Parse the reserved first line of sanitized output.
///
/// Returns `None` when the first non-blank line is not a metadata line.
pub fn parse_metadata(text: &str) -> Option<CollectionMetadata> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let rest = first.strip_prefix(METADATA_PREFIX)?;
    let (date, station) = rest.split_once(';').unwrap_or((rest, ""));
    Some(CollectionMetadata {
        collection_date: clean_field(date),
        station_code: clean_field(station),
    })
}

fn clean_field(s: &str) -> String {
    s.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csv_fences() {
        assert_eq!(sanitize("```csv\na,b\n1,2\n```"), "a,b\n1,2");
    }

    #[test]
    fn strips_bare_fences() {
        assert_eq!(sanitize("```\na,b\n```"), "a,b");
    }

    #[test]
    fn strips_literal_newline_escape_after_fence() {
        assert_eq!(sanitize("```csv\\na,b\n1,2```"), "a,b\n1,2");
        assert_eq!(sanitize("```\\n\na,b\n```\n"), "a,b");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize("  \n a,b\n1,2 \n\n"), "a,b\n1,2");
    }

    #[test]
    fn crlf_preserved() {
        assert_eq!(sanitize("```csv\r\na,b\r\n1,2\r\n```"), "a,b\r\n1,2");
    }

    #[test]
    fn line_breaks_inside_quoted_cells_preserved() {
        let raw = "```csv\n\"Site\",\"Note\"\r\n\"A\",\"line1\r\nline2\"\r\n```";
        assert_eq!(
            sanitize(raw),
            "\"Site\",\"Note\"\r\n\"A\",\"line1\r\nline2\""
        );
    }

    #[test]
    fn lone_carriage_return_in_cell_preserved() {
        let csv = "a,b\n\"x\ry\",2";
        assert_eq!(sanitize(csv), csv);
    }

    #[test]
    fn inner_content_untouched() {
        let csv = "\"Name\",\"Note\"\n\"x\",\"uses `code`\"\n\"y\",???";
        assert_eq!(sanitize(csv), csv);
    }

    #[test]
    fn fences_only_is_empty() {
        assert_eq!(sanitize("```csv\n```"), "");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn metadata_line_is_kept() {
        let out = sanitize("```csv\n#METADATA:2023-10;ABC\na,b\n```");
        assert_eq!(out, "#METADATA:2023-10;ABC\na,b");
    }

    #[test]
    fn parse_full_metadata() {
        let m = parse_metadata("#METADATA:2023-10;ABC\na,b").unwrap();
        assert_eq!(m.collection_date, "2023-10");
        assert_eq!(m.station_code, "ABC");
    }

    #[test]
    fn parse_empty_metadata() {
        let m = parse_metadata("#METADATA:;\na,b").unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn parse_partial_metadata() {
        let m = parse_metadata("#METADATA:;123").unwrap();
        assert_eq!(m.collection_date, "");
        assert_eq!(m.station_code, "123");
    }

    #[test]
    fn missing_metadata_line() {
        assert_eq!(parse_metadata("a,b\n1,2"), None);
        assert_eq!(parse_metadata(""), None);
    }
}
