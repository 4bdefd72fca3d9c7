//! Chapter assembly: fold page fragments into an ordered chapter list.
//!
//! The fold is a single forward pass with no lookahead across pages. Chapter
//! boundaries are defined purely by encounter order, which is why pages must
//! be fed strictly in page order and exactly once; a resumed run feeds only
//! the pages after the checkpoint.
//!
//! ```text
//! page 1: [p "foreword"]           → [""        : p]
//! page 2: [h1 "One", p, h2, p]     → [""        : p] [One : p h2 p]
//! page 3: [p, h1 "Two"]            → [""        : p] [One : p h2 p p] [Two]
//! ```

use crate::document::{Chapter, ContentBlock};
use once_cell::sync::Lazy;
use regex::Regex;

/// Fold `fragments` into `chapters`, returning the updated list.
///
/// A level-1 heading opens a new chapter titled by its text and is not stored
/// as a block. Any other fragment goes to the last chapter, opening an
/// anonymous one (empty title) first if the list is empty.
pub fn fold(mut chapters: Vec<Chapter>, fragments: Vec<ContentBlock>) -> Vec<Chapter> {
    for fragment in fragments {
        push_fragment(&mut chapters, fragment);
    }
    chapters
}

fn push_fragment(chapters: &mut Vec<Chapter>, fragment: ContentBlock) {
    if fragment.is_chapter_heading() {
        chapters.push(Chapter::new(fragment.text()));
        return;
    }
    match chapters.last_mut() {
        Some(current) => current.blocks.push(fragment),
        None => chapters.push(Chapter {
            title: String::new(),
            blocks: vec![fragment],
        }),
    }
}

/// Owned accumulation state threaded through a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterAssembler {
    chapters: Vec<Chapter>,
}

impl ChapterAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from chapters restored out of a checkpoint.
    pub fn from_chapters(chapters: Vec<Chapter>) -> Self {
        Self { chapters }
    }

    /// Fold one page worth of fragments. Returns the number of fragments consumed.
    pub fn push_page(&mut self, fragments: Vec<ContentBlock>) -> usize {
        let n = fragments.len();
        for fragment in fragments {
            push_fragment(&mut self.chapters, fragment);
        }
        n
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn block_count(&self) -> usize {
        self.chapters.iter().map(|c| c.blocks.len()).sum()
    }
}

// ── Simple-mode text → fragments ─────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").unwrap());
static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Split plain extracted text into fragments.
///
/// Paragraphs are separated by blank lines. A paragraph whose first line is a
/// Markdown heading yields a heading fragment plus a paragraph of the lines
/// that follow it. `#` and `##` both open a chapter, since the flat prompt asks
/// the model to mark chapter titles with `##`; deeper markers shift up by one.
pub fn blocks_from_text(text: &str) -> Vec<ContentBlock> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut blocks = Vec::new();

    for chunk in RE_PARAGRAPH_BREAK.split(&normalised) {
        let lines: Vec<&str> = chunk
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let Some((first, rest)) = lines.split_first() else {
            continue;
        };

        match RE_HEADING.captures(first) {
            Some(caps) => {
                let hashes = caps[1].len() as u8;
                let level = if hashes <= 2 { 1 } else { hashes - 1 };
                blocks.push(ContentBlock::heading(level, caps[2].to_string()));
                if !rest.is_empty() {
                    blocks.push(ContentBlock::paragraph(join_visual_lines(rest)));
                }
            }
            None => blocks.push(ContentBlock::paragraph(join_visual_lines(&lines))),
        }
    }

    blocks
}

/// Join lines broken by page layout back into one paragraph.
///
/// CJK text is concatenated directly; anything else gets a single space.
fn join_visual_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        let needs_space = match (out.chars().last(), line.chars().next()) {
            (Some(prev), Some(next)) => !(is_cjk(prev) || is_cjk(next)),
            _ => false,
        };
        if needs_space {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F      // CJK punctuation
        | 0x3040..=0x30FF    // kana
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0xFF00..=0xFFEF    // full-width forms
        | 0xAC00..=0xD7AF)   // hangul
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(level: u8, text: &str) -> ContentBlock {
        ContentBlock::heading(level, text)
    }

    fn p(text: &str) -> ContentBlock {
        ContentBlock::paragraph(text)
    }

    #[test]
    fn consecutive_chapter_headings_leave_first_empty() {
        let chapters = fold(Vec::new(), vec![h(1, "One"), h(1, "Two"), p("body")]);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "One");
        assert!(chapters[0].blocks.is_empty());
        assert_eq!(chapters[1].title, "Two");
        assert_eq!(chapters[1].blocks, vec![p("body")]);
    }

    #[test]
    fn leading_content_goes_to_single_anonymous_chapter() {
        let chapters = fold(
            Vec::new(),
            vec![p("a"), h(2, "sub"), p("b"), h(1, "First"), p("c")],
        );
        assert_eq!(chapters.len(), 2);
        assert!(chapters[0].is_anonymous());
        assert_eq!(chapters[0].blocks, vec![p("a"), h(2, "sub"), p("b")]);
        assert_eq!(chapters[1].title, "First");
    }

    #[test]
    fn chapter_heading_is_not_stored_as_block() {
        let chapters = fold(Vec::new(), vec![h(1, "Title")]);
        assert_eq!(chapters, vec![Chapter::new("Title")]);
    }

    #[test]
    fn only_level_one_opens_a_chapter() {
        let centred = h(1, "One").with_align(crate::document::Alignment::Center);
        assert!(centred.is_chapter_heading());
        assert!(!h(2, "Sub").is_chapter_heading());
        let chapters = fold(Vec::new(), vec![centred, h(2, "Sub")]);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "One");
        assert_eq!(chapters[0].blocks, vec![h(2, "Sub")]);
    }

    #[test]
    fn content_continues_open_chapter_across_pages() {
        let page1 = fold(Vec::new(), vec![h(1, "One"), p("start")]);
        let page2 = fold(page1, vec![p("continued"), h(3, "deep")]);
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].blocks, vec![p("start"), p("continued"), h(3, "deep")]);
    }

    #[test]
    fn empty_page_changes_nothing() {
        let before = fold(Vec::new(), vec![h(1, "One"), p("x")]);
        let after = fold(before.clone(), Vec::new());
        assert_eq!(before, after);
    }

    #[test]
    fn incremental_fold_matches_single_pass() {
        let pages = vec![
            vec![p("pre")],
            vec![h(1, "A"), p("a1")],
            vec![],
            vec![p("a2"), h(1, "B")],
            vec![h(2, "b-sub"), p("b1")],
        ];
        let flat: Vec<ContentBlock> = pages.iter().flatten().cloned().collect();
        let single = fold(Vec::new(), flat);

        let mut assembler = ChapterAssembler::new();
        for page in pages {
            assembler.push_page(page);
        }
        assert_eq!(assembler.chapters(), single.as_slice());
        assert_eq!(assembler.block_count(), 5);
    }

    #[test]
    fn assembler_resumes_from_restored_chapters() {
        let mut restored = ChapterAssembler::from_chapters(vec![Chapter::new("Kept")]);
        restored.push_page(vec![p("more")]);
        assert_eq!(restored.chapters()[0].blocks, vec![p("more")]);
    }

    #[test]
    fn closing_hashes_need_whitespace() {
        assert_eq!(blocks_from_text("## C#"), vec![h(1, "C#")]);
        assert_eq!(blocks_from_text("## Title ##"), vec![h(1, "Title")]);
    }

    #[test]
    fn text_headings_map_to_levels() {
        let blocks = blocks_from_text("## Preface\n\nBody text.\n\n### Section\n\n# Part");
        assert_eq!(
            blocks,
            vec![h(1, "Preface"), p("Body text."), h(2, "Section"), h(1, "Part")]
        );
    }

    #[test]
    fn text_heading_followed_by_lines_in_same_paragraph() {
        let blocks = blocks_from_text("## Title\nfirst line\nsecond line");
        assert_eq!(blocks, vec![h(1, "Title"), p("first line second line")]);
    }

    #[test]
    fn cjk_lines_join_without_space() {
        let blocks = blocks_from_text("这是一段连续的文本内容，\n由于页面排版原因被分割。");
        assert_eq!(blocks, vec![p("这是一段连续的文本内容，由于页面排版原因被分割。")]);
    }

    #[test]
    fn blank_and_crlf_input() {
        assert!(blocks_from_text("").is_empty());
        assert!(blocks_from_text("\n\n\n").is_empty());
        assert_eq!(
            blocks_from_text("first\r\n\r\n\r\n\r\nsecond"),
            vec![p("first"), p("second")]
        );
    }

    #[test]
    fn hashtag_without_space_is_text() {
        assert_eq!(blocks_from_text("#hashtag"), vec![p("#hashtag")]);
    }
}
