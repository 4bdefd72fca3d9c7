//! Prompts sent to the vision model.
//!
//! Every prompt lives here so the oracle code never embeds prose, and tests
//! can inspect the wire contract (field names, allowed values) directly.

/// Plain-text extraction. Chapter titles come back marked with `##`.
pub const FLAT_EXTRACTION_PROMPT: &str = r#"Extract ALL text on this book page accurately, preserving the original reading order and layout.

Rules:
- Separate paragraphs with one blank line. Keep a paragraph's lines together even when the page wraps them.
- Mark an obvious chapter title with "## " at the start of its line.
- Mark smaller section headings with "### ".
- Ignore page numbers, running headers and running footers.
- Return ONLY the extracted text. No commentary, no code fences."#;

/// Structured extraction. The reply must be a JSON array matching
/// [`crate::document::RawBlock`].
pub const STRUCTURED_EXTRACTION_PROMPT: &str = r#"Extract ALL content on this book page as a JSON array of blocks, in reading order.

Each block is an object with exactly these fields:
  "type":    "heading" or "paragraph"
  "level":   integer; 1 for a chapter title, 2-6 for smaller headings, 0 for paragraphs
  "style":   { "align": "left" | "center" | "right" }
  "content": the text of the block

Rules:
- Use level 1 ONLY for the title that starts a new chapter.
- Join lines that the page layout wrapped inside one paragraph.
- Ignore page numbers, running headers and running footers.
- A page with no content yields [].
- Return ONLY the JSON array. No commentary, no code fences."#;

/// Table-of-contents classification. Expected reply: `yes` or `no`.
pub const TOC_CLASSIFICATION_PROMPT: &str = r#"Is this book page a table of contents (a list of chapter or section titles with page numbers)?
Answer with exactly one word: yes or no."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_prompt_names_every_schema_field() {
        for field in ["\"type\"", "\"level\"", "\"style\"", "\"align\"", "\"content\""] {
            assert!(
                STRUCTURED_EXTRACTION_PROMPT.contains(field),
                "missing {field}"
            );
        }
    }

    #[test]
    fn flat_prompt_uses_double_hash_for_chapters() {
        assert!(FLAT_EXTRACTION_PROMPT.contains("\"## \""));
    }
}
