//! Pipeline stages for PDF-to-EPUB conversion.
//!
//! Each submodule implements one step. The stages that talk to the outside
//! world (pdfium, the vision model, the zip container) sit behind traits so
//! the orchestrator in [`crate::convert`] can be driven by fakes in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ oracle ──▶ extract ──▶ (assemble) ──▶ epub
//! (path)    (pdfium)   (base64)   (VLM)      (retry)                   (zip)
//! ```
//!
//! 1. [`input`]   : validate the local path and its `%PDF` magic bytes
//! 2. [`render`]  : rasterise selected pages to PNG files; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]  : base64-wrap a page PNG for the multimodal request body
//! 4. [`oracle`]  : one vision-model call per question (text, blocks, TOC?)
//! 5. [`extract`] : bounded retry with linear backoff around the oracle
//! 6. [`postprocess`] : deterministic cleanup of raw model replies
//! 7. [`epub`]    : render chapters into an EPUB container

pub mod encode;
pub mod epub;
pub mod extract;
pub mod input;
pub mod oracle;
pub mod postprocess;
pub mod render;
