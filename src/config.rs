//! Configuration types for PDF-to-EPUB conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The CLI validates its flags into this
//! one object before anything touches the PDF.

use crate::document::ExtractionMode;
use crate::error::Pdf2EpubError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a PDF-to-EPUB conversion.
///
/// # Example
/// ```rust
/// use edgequake_pdf2epub::{ConversionConfig, ExtractionMode, PageSelection};
///
/// let config = ConversionConfig::builder()
///     .mode(ExtractionMode::Simple)
///     .pages(PageSelection::Range(1, 40))
///     .batch_size(5)
///     .resume(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 200.
    ///
    /// Scanned books often have small print; 200 DPI keeps CJK glyphs legible
    /// to the vision model.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// What the model is asked to return per page. Default: [`ExtractionMode::Rich`].
    pub mode: ExtractionMode,

    /// LLM model identifier. Default: `gemini-2.5-flash`.
    pub model: String,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic"). Default: "gemini".
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// Structured mode wraps every paragraph in JSON, roughly doubling the
    /// output of a dense page compared to plain text.
    pub max_tokens: usize,

    /// Total attempts per oracle call, first try included. Default: 3.
    pub max_retries: u32,

    /// Base delay of the linear backoff in milliseconds. Default: 5000.
    ///
    /// The wait before attempt `k + 1` is `base + k * base`:
    /// 5 s → 10 s → 15 s with the default.
    pub retry_base_delay_ms: u64,

    /// Per-call timeout in seconds; a timeout counts as a failed attempt. Default: 120.
    pub api_timeout_secs: u64,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Checkpoint after this many processed pages. Default: 10.
    pub batch_size: usize,

    /// Continue from a matching checkpoint instead of starting over. Default: false.
    pub resume: bool,

    /// Ask the model whether a page is a table of contents and skip it. Default: true.
    pub skip_toc: bool,

    /// Book title. If None, the PDF's metadata title or file stem is used.
    pub title: Option<String>,

    /// Book author. If None, the PDF's metadata author or "Unknown" is used.
    pub author: Option<String>,

    /// BCP 47 language tag written into the package. Default: "zh".
    pub language: String,

    /// Optional callback invoked as pages progress.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 3000,
            mode: ExtractionMode::default(),
            model: ModelTier::Flash.model_id().to_string(),
            provider_name: Some("gemini".to_string()),
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_base_delay_ms: 5000,
            api_timeout_secs: 120,
            pages: PageSelection::default(),
            batch_size: 10,
            resume: false,
            skip_toc: true,
            title: None,
            author: None,
            language: "zh".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("pages", &self.pages)
            .field("batch_size", &self.batch_size)
            .field("resume", &self.resume)
            .field("skip_toc", &self.skip_toc)
            .field("title", &self.title)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn model_tier(mut self, tier: ModelTier) -> Self {
        self.config.model = tier.model_id().to_string();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn skip_toc(mut self, v: bool) -> Self {
        self.config.skip_toc = v;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2EpubError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2EpubError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_retries == 0 {
            return Err(Pdf2EpubError::InvalidConfig(
                "max_retries counts the first attempt and must be ≥ 1".into(),
            ));
        }
        if c.batch_size == 0 {
            return Err(Pdf2EpubError::InvalidConfig("Batch size must be ≥ 1".into()));
        }
        if c.model.trim().is_empty() {
            return Err(Pdf2EpubError::InvalidConfig("Model must not be empty".into()));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(Pdf2EpubError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}: pages are 1-indexed and start must be <= end"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Shorthand model selector kept from the `--model flash|pro` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelTier {
    /// Fast and cheap; good enough for clean scans. (default)
    #[default]
    Flash,
    /// Slower, better on degraded scans and complex layouts.
    Pro,
}

impl ModelTier {
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelTier::Flash => "gemini-2.5-flash",
            ModelTier::Pro => "gemini-2.5-pro",
        }
    }
}

impl FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flash" => Ok(ModelTier::Flash),
            "pro" => Ok(ModelTier::Pro),
            other => Err(format!("unknown model tier '{other}'")),
        }
    }
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed page numbers.
    ///
    /// Out-of-range pages are dropped; a range is clipped to the document.
    pub fn to_pages(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

impl FromStr for PageSelection {
    type Err = String;

    /// Parse `all`, `5`, `3-15`, or `1,3,5,7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if s == "all" {
            return Ok(PageSelection::All);
        }

        let parse_page = |p: &str| -> Result<usize, String> {
            let n: usize = p
                .trim()
                .parse()
                .map_err(|_| format!("Invalid page number: '{}'", p.trim()))?;
            if n < 1 {
                return Err(format!("Pages are 1-indexed, minimum is 1 (got {n})"));
            }
            Ok(n)
        };

        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse_page(start)?, parse_page(end)?);
            if start > end {
                return Err(format!(
                    "Invalid page range '{start}-{end}': start must be <= end"
                ));
            }
            return Ok(PageSelection::Range(start, end));
        }

        if s.contains(',') {
            let pages = s.split(',').map(parse_page).collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }

        Ok(PageSelection::Single(parse_page(&s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_base_delay_ms, 5000);
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.mode, ExtractionMode::Rich);
        assert_eq!(c.model, "gemini-2.5-flash");
        assert!(!c.resume);
    }

    #[test]
    fn builder_rejects_zero_batch() {
        assert!(ConversionConfig::builder().batch_size(0).build().is_err());
    }

    #[test]
    fn builder_rejects_zero_retries() {
        assert!(ConversionConfig::builder().max_retries(0).build().is_err());
    }

    #[test]
    fn builder_rejects_inverted_range() {
        let err = ConversionConfig::builder()
            .pages(PageSelection::Range(9, 3))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("9-3"), "got: {err}");
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ConversionConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(c.dpi, 600);
    }

    #[test]
    fn model_tier_maps_to_gemini_ids() {
        let c = ConversionConfig::builder()
            .model_tier(ModelTier::Pro)
            .build()
            .unwrap();
        assert_eq!(c.model, "gemini-2.5-pro");
        assert_eq!("flash".parse::<ModelTier>().unwrap(), ModelTier::Flash);
    }

    #[test]
    fn page_selection_to_pages() {
        assert_eq!(PageSelection::All.to_pages(3), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(2).to_pages(3), vec![2]);
        assert_eq!(PageSelection::Single(4).to_pages(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_pages(4), vec![2, 3, 4]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_pages(5), vec![1, 3]);
    }

    #[test]
    fn page_selection_parses_cli_forms() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("7".parse::<PageSelection>().unwrap(), PageSelection::Single(7));
        assert_eq!(
            "3-15".parse::<PageSelection>().unwrap(),
            PageSelection::Range(3, 15)
        );
        assert_eq!(
            "1,3,5".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!("0".parse::<PageSelection>().is_err());
        assert!("5-2".parse::<PageSelection>().is_err());
        assert!("x".parse::<PageSelection>().is_err());
    }
}
