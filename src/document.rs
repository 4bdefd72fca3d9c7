//! Document model shared by every pipeline stage.
//!
//! The vision model describes a page as a loosely-typed JSON list of
//! `{type, level, style: {align}, content}` records. Inside the crate those
//! records become the [`ContentBlock`] tagged union, validated once at the
//! oracle boundary so the assembler and writer never see an ambiguous shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deepest heading level accepted from the oracle (`<h6>`).
pub const MAX_HEADING_LEVEL: u8 = 6;

/// How pages are sent to the vision model and what comes back.
///
/// The accumulated chapters of a run are only meaningful for the mode that
/// produced them, so the mode is part of the checkpoint identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Plain text with Markdown-style `##` chapter markers.
    Simple,
    /// Typed content fragments carrying heading levels and alignment. (default)
    #[default]
    Rich,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Simple => "simple",
            ExtractionMode::Rich => "rich",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(ExtractionMode::Simple),
            "rich" => Ok(ExtractionMode::Rich),
            other => Err(format!("unknown extraction mode '{other}' (expected simple or rich)")),
        }
    }
}

/// Horizontal alignment of a block as seen on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_css(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

impl FromStr for Alignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "justify" => Ok(Alignment::Left),
            "center" | "centre" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            other => Err(format!("unknown alignment '{other}'")),
        }
    }
}

/// One classified unit of extracted page content.
///
/// Serialises to the same `{type, level, style: {align}, content}` shape the
/// vision model emits, so checkpoints stay readable next to raw responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub enum ContentBlock {
    Heading {
        level: u8,
        align: Alignment,
        text: String,
    },
    Paragraph {
        align: Alignment,
        text: String,
    },
}

impl ContentBlock {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        ContentBlock::Heading {
            level,
            align: Alignment::Left,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentBlock::Paragraph {
            align: Alignment::Left,
            text: text.into(),
        }
    }

    pub fn with_align(self, align: Alignment) -> Self {
        match self {
            ContentBlock::Heading { level, text, .. } => ContentBlock::Heading { level, align, text },
            ContentBlock::Paragraph { text, .. } => ContentBlock::Paragraph { align, text },
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ContentBlock::Heading { text, .. } | ContentBlock::Paragraph { text, .. } => text,
        }
    }

    pub fn align(&self) -> Alignment {
        match self {
            ContentBlock::Heading { align, .. } | ContentBlock::Paragraph { align, .. } => *align,
        }
    }

    /// True for a level-1 heading, the only fragment that opens a chapter.
    pub fn is_chapter_heading(&self) -> bool {
        matches!(self, ContentBlock::Heading { level: 1, .. })
    }
}

/// Wire shape of a fragment as produced by the vision model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub style: RawStyle,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStyle {
    #[serde(default)]
    pub align: Option<String>,
}

impl TryFrom<RawBlock> for ContentBlock {
    type Error = String;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let align = match raw.style.align.as_deref() {
            None => Alignment::Left,
            Some(a) => a.parse()?,
        };
        match raw.kind.trim().to_ascii_lowercase().as_str() {
            "heading" => {
                if raw.level == 0 || raw.level > MAX_HEADING_LEVEL {
                    return Err(format!(
                        "heading level must be 1–{MAX_HEADING_LEVEL}, got {}",
                        raw.level
                    ));
                }
                Ok(ContentBlock::Heading {
                    level: raw.level,
                    align,
                    text: raw.content,
                })
            }
            "paragraph" => Ok(ContentBlock::Paragraph {
                align,
                text: raw.content,
            }),
            other => Err(format!("unknown block type '{other}'")),
        }
    }
}

impl From<ContentBlock> for RawBlock {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Heading { level, align, text } => RawBlock {
                kind: "heading".into(),
                level,
                style: RawStyle {
                    align: Some(align.as_css().into()),
                },
                content: text,
            },
            ContentBlock::Paragraph { align, text } => RawBlock {
                kind: "paragraph".into(),
                level: 0,
                style: RawStyle {
                    align: Some(align.as_css().into()),
                },
                content: text,
            },
        }
    }
}

/// A unit of book structure opened by a level-1 heading.
///
/// `title` is empty for the anonymous chapter holding content that precedes
/// the first level-1 heading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
}

impl Chapter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.title.is_empty()
    }
}

/// Book-level metadata written into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
    /// Stable identifier source; the output path in practice.
    pub identifier_seed: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rich_wire_shape() {
        let json = r#"[
            {"type": "heading", "level": 1, "style": {"align": "center"}, "content": "Preface"},
            {"type": "paragraph", "level": 0, "style": {"align": "left"}, "content": "Body"}
        ]"#;
        let blocks: Vec<ContentBlock> = serde_json::from_str(json).unwrap();
        assert_eq!(
            blocks,
            vec![
                ContentBlock::heading(1, "Preface").with_align(Alignment::Center),
                ContentBlock::paragraph("Body"),
            ]
        );
    }

    #[test]
    fn missing_style_defaults_to_left() {
        let blocks: Vec<ContentBlock> =
            serde_json::from_str(r#"[{"type": "paragraph", "content": "x"}]"#).unwrap();
        assert_eq!(blocks[0].align(), Alignment::Left);
    }

    #[test]
    fn rejects_unknown_type() {
        let err = serde_json::from_str::<Vec<ContentBlock>>(
            r#"[{"type": "table", "level": 0, "content": "x"}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("table"), "got: {err}");
    }

    #[test]
    fn rejects_level_zero_heading() {
        assert!(serde_json::from_str::<Vec<ContentBlock>>(
            r#"[{"type": "heading", "level": 0, "content": "x"}]"#
        )
        .is_err());
    }

    #[test]
    fn rejects_missing_content() {
        assert!(serde_json::from_str::<Vec<ContentBlock>>(r#"[{"type": "paragraph"}]"#).is_err());
    }

    #[test]
    fn serialises_back_to_wire_shape() {
        let block = ContentBlock::heading(2, "Intro").with_align(Alignment::Right);
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "heading");
        assert_eq!(value["level"], 2);
        assert_eq!(value["style"]["align"], "right");
        assert_eq!(value["content"], "Intro");
    }

    #[test]
    fn mode_round_trips_through_str() {
        assert_eq!("Rich".parse::<ExtractionMode>().unwrap(), ExtractionMode::Rich);
        assert_eq!(ExtractionMode::Simple.to_string(), "simple");
        assert!("fancy".parse::<ExtractionMode>().is_err());
    }
}
