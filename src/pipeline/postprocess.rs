//! Post-processing: deterministic cleanup of raw vision-model replies.
//!
//! Even well-prompted models wrap replies in ` ```json ` fences, prepend a
//! sentence of commentary, or leak zero-width characters from the scan. These
//! rules strip that noise before the reply reaches the parser, so a fenced
//! but otherwise valid answer is never mistaken for a malformed one.
//!
//! Rule order matters: normalise line endings before trimming, and strip
//! fences before looking for the JSON array.

use crate::document::ContentBlock;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a plain-text (simple mode) reply.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive newlines down to one blank line
/// 6. Trim the ends
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Parse a structured (rich mode) reply into validated fragments.
///
/// Returns `Err` with a human-readable reason when the reply is not a JSON
/// array of well-formed blocks. An empty array is a valid, empty page.
pub fn parse_blocks(input: &str) -> Result<Vec<ContentBlock>, String> {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = remove_invisible_chars(&s);
    let json = json_array_slice(&s).ok_or_else(|| {
        format!(
            "expected a JSON array of blocks, got: {}",
            preview(s.trim(), 120)
        )
    })?;

    let blocks: Vec<ContentBlock> =
        serde_json::from_str(json).map_err(|e| format!("invalid block list: {e}"))?;

    Ok(blocks
        .into_iter()
        .map(|b| match b {
            ContentBlock::Heading { level, align, text } => ContentBlock::Heading {
                level,
                align,
                text: text.trim().to_string(),
            },
            ContentBlock::Paragraph { align, text } => ContentBlock::Paragraph {
                align,
                text: text.trim().to_string(),
            },
        })
        .filter(|b| !b.text().is_empty())
        .collect())
}

/// Interpret a table-of-contents classification reply.
///
/// Returns `None` when the answer is neither yes nor no.
pub fn parse_yes_no(input: &str) -> Option<bool> {
    let answer = strip_code_fences(&normalise_line_endings(input));
    let word = answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if word.starts_with("yes") || word.starts_with("true") || word.starts_with('是') {
        Some(true)
    } else if word.starts_with("no") || word.starts_with("false") || word.starts_with('否') {
        Some(false)
    } else {
        None
    }
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── JSON location ────────────────────────────────────────────────────────────

/// Where the block array opens: a `[` starting a line, or one followed by
/// `{` or `]`. Bracketed references in commentary (`see note [1]`) never match.
static RE_ARRAY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\[|\[\s*[{\]]").unwrap());

/// The `[ … ]` span of the block array, tolerating commentary around it.
fn json_array_slice(input: &str) -> Option<&str> {
    let m = RE_ARRAY_START.find(input)?;
    let start = m.start() + m.as_str().find('[')?;
    let end = input.rfind(']')?;
    (end > start).then(|| &input[start..=end])
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Alignment;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\nhello\n```"), "hello");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn test_clean_text_pipeline() {
        let input = "```\n## 译者序\r\n\r\n\r\n\r\nBody   \u{200B}\n```";
        assert_eq!(clean_text(input), "## 译者序\n\nBody");
    }

    #[test]
    fn test_parse_fenced_blocks() {
        let reply = "```json\n[{\"type\":\"heading\",\"level\":1,\"style\":{\"align\":\"center\"},\"content\":\" 译者序 \"}]\n```";
        let blocks = parse_blocks(reply).unwrap();
        assert_eq!(
            blocks,
            vec![ContentBlock::heading(1, "译者序").with_align(Alignment::Center)]
        );
    }

    #[test]
    fn test_parse_blocks_with_commentary() {
        let reply = "Here is the page:\n[{\"type\":\"paragraph\",\"level\":0,\"content\":\"x\"}]\nDone.";
        assert_eq!(parse_blocks(reply).unwrap(), vec![ContentBlock::paragraph("x")]);
    }

    #[test]
    fn test_bracketed_reference_in_commentary_is_skipped() {
        let reply = "See note [1]:\n[{\"type\":\"paragraph\",\"level\":0,\"content\":\"x\"}]";
        assert_eq!(parse_blocks(reply).unwrap(), vec![ContentBlock::paragraph("x")]);
        let inline = "Blocks: [1] then [ {\"type\":\"paragraph\",\"level\":0,\"content\":\"y\"} ]";
        assert_eq!(parse_blocks(inline).unwrap(), vec![ContentBlock::paragraph("y")]);
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert_eq!(parse_blocks("[]").unwrap(), Vec::<ContentBlock>::new());
    }

    #[test]
    fn test_blank_blocks_are_dropped() {
        let reply = r#"[{"type":"paragraph","level":0,"content":"   "}]"#;
        assert!(parse_blocks(reply).unwrap().is_empty());
    }

    #[test]
    fn test_non_json_is_malformed() {
        let err = parse_blocks("Sorry, I cannot read this page.").unwrap_err();
        assert!(err.contains("JSON array"), "got: {err}");
    }

    #[test]
    fn test_schema_violation_is_malformed() {
        let err = parse_blocks(r#"[{"type":"figure","level":0,"content":"x"}]"#).unwrap_err();
        assert!(err.contains("figure"), "got: {err}");
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("Yes."), Some(true));
        assert_eq!(parse_yes_no("  no\n"), Some(false));
        assert_eq!(parse_yes_no("是"), Some(true));
        assert_eq!(parse_yes_no("**No**"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let s = "目".repeat(10);
        assert_eq!(preview(&s, 3), "目目目\u{2026}");
    }
}
