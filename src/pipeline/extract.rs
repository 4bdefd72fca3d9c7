//! Retrying extraction adapter.
//!
//! Wraps every oracle call with a bounded retry loop and linear backoff, and
//! turns the oracle's answer into the fragments the assembler folds.
//!
//! ## Retry Strategy
//!
//! Vision APIs fail transiently (HTTP 429/503, timeouts) far more often under
//! sustained book-length load than on single requests. The wait grows
//! linearly, `base + k * base` after the `k`-th failure (0-based): with the
//! default 5 s base and 3 attempts the sequence is 5 s → 10 s, and no wait
//! follows the final failure.
//!
//! A malformed payload is not retried: the same page and prompt tend to
//! produce the same shape again, so the run stops and can be resumed later.

use crate::assemble::blocks_from_text;
use crate::config::ConversionConfig;
use crate::document::{ContentBlock, ExtractionMode};
use crate::error::{OracleError, PageError};
use crate::pipeline::oracle::ExtractionOracle;
use crate::pipeline::render::PageArtifact;
use crate::progress::ProgressCallback;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded attempts with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Wait after the `failed`-th failed attempt (1-based).
    pub fn backoff(&self, failed: u32) -> Duration {
        self.base_delay * failed
    }
}

/// What one page contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Classified as table of contents; contributes nothing.
    SkippedToc,
    /// Ordered fragments, possibly empty.
    Fragments(Vec<ContentBlock>),
}

/// Drives the oracle for one page at a time under a [`RetryPolicy`].
pub struct ExtractionAdapter<'a> {
    oracle: &'a dyn ExtractionOracle,
    policy: RetryPolicy,
    mode: ExtractionMode,
    skip_toc: bool,
    progress: Option<ProgressCallback>,
    retries: AtomicU32,
}

impl<'a> ExtractionAdapter<'a> {
    pub fn new(
        oracle: &'a dyn ExtractionOracle,
        policy: RetryPolicy,
        mode: ExtractionMode,
        skip_toc: bool,
    ) -> Self {
        Self {
            oracle,
            policy,
            mode,
            skip_toc,
            progress: None,
            retries: AtomicU32::new(0),
        }
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    /// Failed attempts that were followed by another one, across all pages.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Classify, then extract one page.
    pub async fn extract(&self, page: &PageArtifact) -> Result<Extraction, PageError> {
        let page_num = page.page_num;

        if self.skip_toc
            && self
                .with_retry(page_num, || self.oracle.classify_toc(page))
                .await?
        {
            debug!("Page {}: table of contents, skipped", page_num);
            return Ok(Extraction::SkippedToc);
        }

        let fragments = match self.mode {
            ExtractionMode::Simple => {
                let text = self
                    .with_retry(page_num, || self.oracle.extract_flat(page))
                    .await?;
                blocks_from_text(&text)
            }
            ExtractionMode::Rich => {
                self.with_retry(page_num, || self.oracle.extract_structured(page))
                    .await?
            }
        };
        debug!("Page {}: {} fragments", page_num, fragments.len());
        Ok(Extraction::Fragments(fragments))
    }

    async fn with_retry<T, F, Fut>(&self, page: usize, mut call: F) -> Result<T, PageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(OracleError::Malformed(detail)) => {
                    warn!("Page {}: malformed response: {}", page, detail);
                    return Err(PageError::MalformedResponse { page, detail });
                }
                Err(OracleError::Transport(detail)) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(PageError::ExtractionFailed {
                            page,
                            attempts: attempt,
                            detail,
                        });
                    }
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        "Page {}: attempt {}/{} failed: {}; retrying in {:?}",
                        page, attempt, self.policy.max_attempts, detail, wait
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_extraction_retry(page, attempt, &detail);
                    }
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
