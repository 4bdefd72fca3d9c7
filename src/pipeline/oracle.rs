//! Extraction oracle: ask the vision model about one page image.
//!
//! The oracle makes exactly one request per call and never retries; retry and
//! backoff policy belongs to [`crate::pipeline::extract`]. Every failure is
//! classified as either [`OracleError::Transport`] (worth another attempt) or
//! [`OracleError::Malformed`] (the model answered, but not in the agreed
//! shape).
//!
//! All prompt text lives in [`crate::prompts`].

use crate::config::ConversionConfig;
use crate::document::ContentBlock;
use crate::error::OracleError;
use crate::pipeline::encode;
use crate::pipeline::postprocess;
use crate::pipeline::render::PageArtifact;
use crate::prompts::{
    FLAT_EXTRACTION_PROMPT, STRUCTURED_EXTRACTION_PROMPT, TOC_CLASSIFICATION_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Answers questions about a single page image.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Plain text of the page, chapter titles marked with `##`.
    async fn extract_flat(&self, page: &PageArtifact) -> Result<String, OracleError>;

    /// Typed fragments of the page, validated against the block schema.
    async fn extract_structured(
        &self,
        page: &PageArtifact,
    ) -> Result<Vec<ContentBlock>, OracleError>;

    /// Whether the page is a table of contents.
    async fn classify_toc(&self, page: &PageArtifact) -> Result<bool, OracleError>;
}

/// Oracle backed by an `edgequake-llm` vision provider.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// One request: system prompt, then the page image as the user turn.
    async fn ask(&self, page: &PageArtifact, prompt: &str) -> Result<String, OracleError> {
        let image = encode::encode_page(page).await.map_err(|e| {
            OracleError::Transport(format!("could not read {}: {}", page.path.display(), e))
        })?;
        let messages = build_messages(prompt, image);

        let start = Instant::now();
        let response =
            match tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&self.options)))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(OracleError::Transport(e.to_string())),
                Err(_) => {
                    return Err(OracleError::Transport(format!(
                        "no response within {}s",
                        self.timeout.as_secs()
                    )))
                }
            };

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page.page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ExtractionOracle for LlmOracle {
    async fn extract_flat(&self, page: &PageArtifact) -> Result<String, OracleError> {
        let raw = self.ask(page, FLAT_EXTRACTION_PROMPT).await?;
        Ok(postprocess::clean_text(&raw))
    }

    async fn extract_structured(
        &self,
        page: &PageArtifact,
    ) -> Result<Vec<ContentBlock>, OracleError> {
        let raw = self.ask(page, STRUCTURED_EXTRACTION_PROMPT).await?;
        postprocess::parse_blocks(&raw).map_err(OracleError::Malformed)
    }

    async fn classify_toc(&self, page: &PageArtifact) -> Result<bool, OracleError> {
        let raw = self.ask(page, TOC_CLASSIFICATION_PROMPT).await?;
        Ok(postprocess::parse_yes_no(&raw).unwrap_or_else(|| {
            warn!(
                "Page {}: unclear table-of-contents answer {:?}, keeping the page",
                page.page_num,
                raw.trim()
            );
            false
        }))
    }
}

fn build_messages(prompt: &str, image: ImageData) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompt),
        ChatMessage::user_with_images("", vec![image]),
    ]
}

fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
