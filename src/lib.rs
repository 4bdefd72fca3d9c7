//! # edgequake-pdf2epub
//!
//! Convert scanned PDF books into chapterised EPUB using Vision Language
//! Models (VLMs).
//!
//! ## Why this crate?
//!
//! Scanned books have no text layer, and OCR engines lose the structure a
//! reader cares about: where a chapter starts, which lines are headings, how
//! a paragraph was wrapped. This crate rasterises each page, lets a VLM read
//! it as a human would, and folds the results page by page into chapters.
//!
//! Book-length runs take hours and hit rate limits, so the pipeline is
//! **resumable**: every few pages it writes a checkpoint and a partial EPUB,
//! and a failed or interrupted run picks up from the last completed page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate local path and %PDF magic
//!  ├─ 2. Render     rasterise one batch of pages via pdfium (spawn_blocking)
//!  ├─ 3. Extract    per page: TOC check, then text or typed blocks,
//!  │                retried with linear backoff
//!  ├─ 4. Assemble   level-1 headings open chapters; everything else folds in
//!  ├─ 5. Checkpoint every `batch_size` pages: progress JSON + partial EPUB
//!  └─ 6. Finalise   promote the partial EPUB, delete the checkpoint
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2epub::{convert, ConversionConfig, ExtractionMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini by default; reads GEMINI_API_KEY.
//!     let config = ConversionConfig::builder()
//!         .mode(ExtractionMode::Rich)
//!         .resume(true)
//!         .build()?;
//!     let output = convert("book.pdf", "book.epub", &config).await?;
//!     eprintln!("{} chapters from {} pages",
//!         output.stats.chapters,
//!         output.stats.processed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2epub` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2epub = { version = "0.1", default-features = false }
//! ```
//!
//! ## Extraction Modes
//!
//! | Mode     | Model returns                         | Chapters from             |
//! |----------|---------------------------------------|---------------------------|
//! | `simple` | plain text with `##` chapter markers  | `#`/`##` lines            |
//! | `rich`   | JSON blocks with level and alignment  | level-1 heading blocks    |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{blocks_from_text, fold, ChapterAssembler};
pub use checkpoint::{CheckpointError, CheckpointStore, LoadOutcome, ProgressCheckpoint};
pub use config::{ConversionConfig, ConversionConfigBuilder, ModelTier, PageSelection};
pub use convert::{convert, convert_sync, convert_with, convert_with_cancel, inspect};
pub use document::{Alignment, BookMetadata, Chapter, ContentBlock, ExtractionMode};
pub use error::{OracleError, PageError, Pdf2EpubError};
pub use output::{format_duration, ConversionOutput, ConversionStats};
pub use pipeline::epub::{EpubWriter, OutputWriter};
pub use pipeline::extract::{Extraction, ExtractionAdapter, RetryPolicy};
pub use pipeline::oracle::{ExtractionOracle, LlmOracle};
pub use pipeline::render::{DocumentInfo, PageArtifact, PdfiumRasterizer, Rasterizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tokio_util::sync::CancellationToken;
