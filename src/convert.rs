//! Conversion entry points and the page-loop orchestrator.
//!
//! [`convert`] wires the production collaborators (pdfium, an
//! `edgequake-llm` vision provider, the zip EPUB writer) into
//! [`convert_with`], which owns the run: resume-or-fresh decision, the
//! strictly sequential page loop, checkpoint cadence, and finalisation.
//!
//! ## Run lifecycle
//!
//! ```text
//! Fresh ──▶ Running ──▶ Checkpointed ──▶ … ──▶ Finalized
//!   ▲          │              │
//!   │          └──────┬───────┘
//!   │                 ▼
//!   └── resume ─── Aborted   (checkpoint left on disk)
//! ```
//!
//! Every failure after the first page converts into checkpoint-then-abort:
//! the checkpoint records the last fully completed page, so `--resume` picks
//! up exactly where the run stopped and replays nothing.

use crate::assemble::ChapterAssembler;
use crate::checkpoint::{CheckpointStore, LoadOutcome, ProgressCheckpoint};
use crate::config::{ConversionConfig, PageSelection};
use crate::document::BookMetadata;
use crate::error::{PageError, Pdf2EpubError};
use crate::output::{format_millis, ConversionOutput, ConversionStats};
use crate::pipeline::epub::{EpubWriter, OutputWriter};
use crate::pipeline::extract::{Extraction, ExtractionAdapter, RetryPolicy};
use crate::pipeline::input::{self, input_stem};
use crate::pipeline::oracle::{ExtractionOracle, LlmOracle};
use crate::pipeline::render::{DocumentInfo, PageArtifact, PdfiumRasterizer, Rasterizer};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Convert a PDF into a chapterised EPUB at `output`.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Fatal conditions only. When the run stops after the first page (extraction
/// failure, malformed response) a checkpoint is left next to `output`, and
/// calling again with [`ConversionConfig::resume`] set continues from it.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2epub::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder().resume(true).build()?;
/// let out = convert("book.pdf", "book.epub", &config).await?;
/// eprintln!("{} chapters", out.stats.chapters);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    convert_with_cancel(input, output, config, CancellationToken::new()).await
}

/// [`convert`], stopping at the next page boundary once `cancel` fires.
///
/// Cancellation saves a checkpoint and returns [`Pdf2EpubError::Interrupted`].
pub async fn convert_with_cancel(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: CancellationToken,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let pdf_path = input::resolve_input(input)?;
    let provider = resolve_provider(config)?;

    let rasterizer = PdfiumRasterizer::new(config.max_rendered_pixels);
    let oracle = LlmOracle::new(provider, config);

    convert_with(
        &pdf_path,
        output.as_ref(),
        config,
        &rasterizer,
        &oracle,
        &EpubWriter,
        &cancel,
    )
    .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2EpubError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, output, config))
}

/// Read PDF metadata without converting anything.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentInfo, Pdf2EpubError> {
    let pdf_path = input::resolve_input(input)?;
    PdfiumRasterizer::default().document_info(&pdf_path).await
}

/// Run the page loop over explicit collaborators.
///
/// `input` is not validated here; the rasteriser is the only component that
/// reads it.
pub async fn convert_with(
    input: &Path,
    output: &Path,
    config: &ConversionConfig,
    rasterizer: &dyn Rasterizer,
    oracle: &dyn ExtractionOracle,
    writer: &dyn OutputWriter,
    cancel: &CancellationToken,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let total_start = Instant::now();
    let input_id = input.to_string_lossy().into_owned();
    let output_id = output.to_string_lossy().into_owned();
    info!("Starting conversion: {} → {}", input_id, output_id);

    // ── Step 1: Inspect the document ─────────────────────────────────────
    let doc = rasterizer.document_info(input).await?;
    let selected = config.pages.to_pages(doc.page_count);
    let Some(&last_page) = selected.last() else {
        return Err(Pdf2EpubError::PageOutOfRange {
            page: first_requested_page(config),
            total: doc.page_count,
        });
    };
    debug!("Selected {} of {} pages", selected.len(), doc.page_count);

    let mut meta = BookMetadata {
        title: config
            .title
            .clone()
            .or(doc.title)
            .unwrap_or_else(|| input_stem(input)),
        author: config
            .author
            .clone()
            .or(doc.author)
            .unwrap_or_else(|| "Unknown".to_string()),
        language: config.language.clone(),
        identifier_seed: output_id.clone(),
    };

    // ── Step 2: Resume or start fresh ────────────────────────────────────
    let store = CheckpointStore::for_run(input, output);
    let mut run = RunState {
        assembler: ChapterAssembler::new(),
        processed_through: 0,
        since_checkpoint: 0,
    };
    let mut stats = ConversionStats {
        selected_pages: selected.len(),
        ..Default::default()
    };

    let resumed = if config.resume {
        match store.load(&input_id, &output_id, config.mode).await {
            LoadOutcome::Resumable(cp) => Some(cp),
            LoadOutcome::Absent => {
                info!("No checkpoint found, starting fresh");
                None
            }
            LoadOutcome::Mismatch => {
                info!("Checkpoint does not match this input, output and mode; starting fresh");
                None
            }
            LoadOutcome::Corrupt(_) => None,
        }
    } else {
        None
    };

    match resumed {
        Some(cp) => {
            info!(
                "Resuming from page {} ({} chapters restored)",
                cp.next_page(),
                cp.accumulated_chapters.len()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_resume(cp.next_page(), last_page);
            }
            if config.title.is_none() && !cp.title.is_empty() {
                meta.title = cp.title;
            }
            run.processed_through = cp.processed_page_count;
            run.assembler = ChapterAssembler::from_chapters(cp.accumulated_chapters);
            stats.resumed_from = Some(cp.processed_page_count + 1);
        }
        None => store.discard().await,
    }

    let remaining: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&p| p > run.processed_through)
        .collect();

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(remaining.len(), last_page);
    }

    let ctx = RunContext {
        input_id: &input_id,
        output_id: &output_id,
        total_pages: last_page,
        config,
        meta: &meta,
        store: &store,
        writer,
    };

    // ── Step 3: Page loop ────────────────────────────────────────────────
    let adapter = ExtractionAdapter::new(
        oracle,
        RetryPolicy::from_config(config),
        config.mode,
        config.skip_toc,
    )
    .with_progress(config.progress_callback.clone());

    let work_dir = tempfile::TempDir::new()
        .map_err(|e| Pdf2EpubError::Internal(format!("Failed to create work dir: {}", e)))?;

    let batch_size = config.batch_size.max(1);
    for batch in remaining.chunks(batch_size) {
        if cancel.is_cancelled() {
            return ctx.interrupt(&mut run, batch[0]).await;
        }

        let render_start = Instant::now();
        let artifacts = rasterizer
            .rasterize(input, config.dpi, batch, work_dir.path())
            .await?;
        stats.render_duration_ms += render_start.elapsed().as_millis() as u64;

        for &page_num in batch {
            if cancel.is_cancelled() {
                return ctx.interrupt(&mut run, page_num).await;
            }

            let Some(artifact) = artifacts.iter().find(|a| a.page_num == page_num) else {
                return ctx.missing_page(&mut run, page_num).await;
            };

            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_num, last_page);
            }
            let page_start = Instant::now();
            let step = process_page(&adapter, &mut run.assembler, artifact).await;
            discard_artifact(artifact).await;

            match step {
                PageStep::Folded { fragments } => {
                    debug!("Page {}: folded {} fragments", page_num, fragments);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_page_complete(page_num, last_page, fragments);
                    }
                }
                PageStep::SkippedToc => {
                    info!("Page {}: table of contents, skipped", page_num);
                    stats.skipped_toc_pages += 1;
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_page_skipped(page_num, last_page);
                    }
                }
                PageStep::Abort(e) => return ctx.abort(&mut run, e).await,
            }

            run.processed_through = page_num;
            run.since_checkpoint += 1;
            stats.processed_pages += 1;
            stats
                .page_durations_ms
                .push(page_start.elapsed().as_millis() as u64);

            if run.since_checkpoint >= batch_size {
                ctx.checkpoint(&mut run).await?;
                log_estimate(&stats, remaining.len());
            }
        }
    }

    // ── Step 4: Finalise ─────────────────────────────────────────────────
    if run.since_checkpoint > 0 {
        ctx.checkpoint(&mut run).await?;
    }
    if stats.processed_pages == 0 || !store.temp_output_path().exists() {
        // Nothing new this invocation: rebuild the book from restored state.
        writer
            .render(run.assembler.chapters(), &meta, store.temp_output_path())
            .await?;
    }
    store.promote(output).await?;

    stats.chapters = run.assembler.chapters().len();
    stats.blocks = run.assembler.block_count();
    stats.retries = adapter.retries();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} pages, {} chapters, {} total",
        stats.processed_pages,
        stats.chapters,
        format_millis(stats.total_duration_ms)
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(stats.processed_pages, stats.chapters);
    }

    Ok(ConversionOutput {
        output_path: output.to_path_buf(),
        metadata: meta,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Outcome of one page, matched on by the page loop.
#[derive(Debug)]
enum PageStep {
    Folded { fragments: usize },
    SkippedToc,
    Abort(PageError),
}

/// Mutable progress of the current invocation.
struct RunState {
    assembler: ChapterAssembler,
    /// Last fully processed page; 0 before the first.
    processed_through: usize,
    since_checkpoint: usize,
}

/// Everything a checkpoint needs that does not change during the run.
struct RunContext<'a> {
    input_id: &'a str,
    output_id: &'a str,
    total_pages: usize,
    config: &'a ConversionConfig,
    meta: &'a BookMetadata,
    store: &'a CheckpointStore,
    writer: &'a dyn OutputWriter,
}

impl RunContext<'_> {
    /// Persist progress, then regenerate the temporary book from it.
    async fn checkpoint(&self, run: &mut RunState) -> Result<(), Pdf2EpubError> {
        let cp = ProgressCheckpoint {
            input_id: self.input_id.to_string(),
            output_id: self.output_id.to_string(),
            processed_page_count: run.processed_through,
            total_page_count: self.total_pages,
            mode: self.config.mode,
            accumulated_chapters: run.assembler.chapters().to_vec(),
            title: self.meta.title.clone(),
        };
        self.store.save(&cp).await?;
        self.writer
            .render_incremental(
                self.store.temp_output_path(),
                run.assembler.chapters(),
                self.meta,
            )
            .await?;
        run.since_checkpoint = 0;

        info!(
            "Checkpoint: page {}/{} saved ({} chapters)",
            run.processed_through,
            self.total_pages,
            run.assembler.chapters().len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_checkpoint(run.processed_through, self.total_pages);
        }
        Ok(())
    }

    /// Checkpoint what is complete, then surface the page failure.
    async fn abort(
        &self,
        run: &mut RunState,
        e: PageError,
    ) -> Result<ConversionOutput, Pdf2EpubError> {
        error!("{}", e);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_error(e.page(), self.total_pages, &e.to_string());
        }
        self.save_before_exit(run).await;
        Err(e.into())
    }

    async fn interrupt(
        &self,
        run: &mut RunState,
        next_page: usize,
    ) -> Result<ConversionOutput, Pdf2EpubError> {
        warn!("Interrupted before page {}", next_page);
        self.save_before_exit(run).await;
        Err(Pdf2EpubError::Interrupted { page: next_page })
    }

    /// The rasteriser skipped a selected page: keep what the batch produced.
    async fn missing_page(
        &self,
        run: &mut RunState,
        page_num: usize,
    ) -> Result<ConversionOutput, Pdf2EpubError> {
        error!("Page {} was not rendered", page_num);
        self.save_before_exit(run).await;
        Err(Pdf2EpubError::RasterisationFailed {
            page: page_num,
            detail: "page was not rendered".to_string(),
        })
    }

    /// A failed save must not mask the error that stopped the run.
    async fn save_before_exit(&self, run: &mut RunState) {
        if let Err(e) = self.checkpoint(run).await {
            error!("Could not save progress before exiting: {}", e);
        }
    }
}

async fn process_page(
    adapter: &ExtractionAdapter<'_>,
    assembler: &mut ChapterAssembler,
    artifact: &PageArtifact,
) -> PageStep {
    match adapter.extract(artifact).await {
        Ok(Extraction::SkippedToc) => PageStep::SkippedToc,
        Ok(Extraction::Fragments(fragments)) => PageStep::Folded {
            fragments: assembler.push_page(fragments),
        },
        Err(e) => PageStep::Abort(e),
    }
}

async fn discard_artifact(artifact: &PageArtifact) {
    if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
        debug!("Could not remove {}: {}", artifact.path.display(), e);
    }
}

fn log_estimate(stats: &ConversionStats, remaining_total: usize) {
    let left = remaining_total.saturating_sub(stats.processed_pages);
    if let (Some(avg), Some(eta)) = (stats.average_page_ms(), stats.estimate_remaining_ms(left)) {
        info!(
            "Average {} per page, about {} left for {} pages",
            format_millis(avg),
            format_millis(eta),
            left
        );
    }
}

fn first_requested_page(config: &ConversionConfig) -> usize {
    match &config.pages {
        PageSelection::All => 1,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(1),
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2EpubError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2EpubError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`, "gemini" by default) with
///    `config.model`; the factory reads the matching API key from the
///    environment (`GEMINI_API_KEY`, `OPENAI_API_KEY`, …).
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2EpubError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, &config.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2EpubError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_requested_page_reports_selection_start() {
        let config = |pages| ConversionConfig {
            pages,
            ..Default::default()
        };
        assert_eq!(first_requested_page(&config(PageSelection::All)), 1);
        assert_eq!(first_requested_page(&config(PageSelection::Range(40, 50))), 40);
        assert_eq!(
            first_requested_page(&config(PageSelection::Set(vec![9, 3]))),
            3
        );
    }
}
