//! Error types for the edgequake-pdf2epub library.
//!
//! * [`Pdf2EpubError`] is **fatal**: the run stops. Returned from the
//!   top-level `convert*` functions. When it stops mid-document the
//!   orchestrator has already written a checkpoint through the last
//!   completed page, so re-running with `--resume` continues from there.
//!
//! * [`PageError`]: the terminal outcome of one page after the retry policy
//!   gave up. The orchestrator turns it into checkpoint-then-abort.
//!
//! * [`OracleError`]: a single failed call to the vision model. Transport
//!   failures are retried; malformed payloads are not.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2epub library.
#[derive(Debug, Error)]
pub enum Pdf2EpubError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The page selection does not intersect the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium failed to bind, open, or render.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Extraction of a page failed after every retry.
    #[error(
        "Extraction of page {page} failed after {attempts} attempts: {last_error}\n\
Progress is saved; re-run with --resume to continue from page {page}."
    )]
    ExtractionFailed {
        page: usize,
        attempts: u32,
        last_error: String,
    },

    /// The model answered, but not in the expected fragment schema.
    #[error(
        "Malformed response for page {page}: {detail}\n\
Progress is saved; re-run with --resume to continue from page {page}."
    )]
    MalformedResponse { page: usize, detail: String },

    /// The run was cancelled between pages.
    #[error("Interrupted before page {page}; progress is saved, re-run with --resume to continue.")]
    Interrupted { page: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the EPUB (final or temporary).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not persist the progress checkpoint.
    #[error("Failed to write checkpoint '{path}': {detail}")]
    CheckpointWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2EpubError {
    /// Process exit status for this error, distinct per failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Pdf2EpubError::InvalidConfig(_) | Pdf2EpubError::ProviderNotConfigured { .. } => 2,
            Pdf2EpubError::FileNotFound { .. }
            | Pdf2EpubError::PermissionDenied { .. }
            | Pdf2EpubError::NotAPdf { .. }
            | Pdf2EpubError::CorruptPdf { .. }
            | Pdf2EpubError::PageOutOfRange { .. }
            | Pdf2EpubError::RasterisationFailed { .. } => 3,
            Pdf2EpubError::ExtractionFailed { .. } => 4,
            Pdf2EpubError::MalformedResponse { .. } => 5,
            Pdf2EpubError::OutputWriteFailed { .. }
            | Pdf2EpubError::CheckpointWriteFailed { .. } => 6,
            Pdf2EpubError::Interrupted { .. } => 130,
            Pdf2EpubError::Internal(_) => 1,
        }
    }

    /// True when a checkpoint was left behind for `--resume`.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Pdf2EpubError::ExtractionFailed { .. }
                | Pdf2EpubError::MalformedResponse { .. }
                | Pdf2EpubError::Interrupted { .. }
        )
    }
}

/// Terminal failure of a single page.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Every attempt failed in transport.
    #[error("Page {page}: extraction failed after {attempts} attempts: {detail}")]
    ExtractionFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The payload arrived but violates the fragment schema. Not retried.
    #[error("Page {page}: malformed response: {detail}")]
    MalformedResponse { page: usize, detail: String },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractionFailed { page, .. } | PageError::MalformedResponse { page, .. } => {
                *page
            }
        }
    }
}

impl From<PageError> for Pdf2EpubError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::ExtractionFailed {
                page,
                attempts,
                detail,
            } => Pdf2EpubError::ExtractionFailed {
                page,
                attempts,
                last_error: detail,
            },
            PageError::MalformedResponse { page, detail } => {
                Pdf2EpubError::MalformedResponse { page, detail }
            }
        }
    }
}

/// A single failed call to the extraction oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// Network, HTTP status, timeout, or provider failure. Retryable.
    #[error("{0}")]
    Transport(String),

    /// Well-delivered response that does not parse into the expected shape.
    #[error("{0}")]
    Malformed(String),
}
