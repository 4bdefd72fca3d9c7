//! CLI binary for edgequake-pdf2epub.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, wires Ctrl-C to a cancellation token, and turns the
//! library error into a distinct process exit status.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2epub::output::format_millis;
use edgequake_pdf2epub::{
    convert_with_cancel, inspect, CancellationToken, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, ExtractionMode, ModelTier, PageSelection, Pdf2EpubError,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress: one bar at the bottom, one log line per page above it.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently being extracted.
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us how many pages remain.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, remaining: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(remaining as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> String {
        let started = self.page_started.lock().ok().and_then(|mut s| s.take());
        let ms = started.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0);
        format_millis(ms)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, remaining: usize, total_pages: usize) {
        self.activate_bar(remaining);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Converting {remaining} pages (through page {total_pages})…"
            ))
        ));
    }

    fn on_resume(&self, next_page: usize, total_pages: usize) {
        self.bar.println(format!(
            "{} Resuming at page {next_page}/{total_pages}",
            cyan("↻")
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, fragments: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{fragments:>3} blocks")),
            dim(&self.page_elapsed()),
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            dim("–"),
            page_num,
            total,
            dim("table of contents, skipped"),
            dim(&self.page_elapsed()),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_retry(&self, page_num: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}  attempt {} failed: {}",
            yellow("↻"),
            page_num,
            attempt,
            dim(&truncate(error, 80)),
        ));
    }

    fn on_checkpoint(&self, processed_page: usize, total_pages: usize) {
        self.bar.println(format!(
            "  {} {}",
            cyan("⛁"),
            dim(&format!("progress saved through page {processed_page}/{total_pages}")),
        ));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            dim(&self.page_elapsed()),
        ));
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, _processed: usize, _chapters: usize) {
        self.bar.finish_and_clear();
    }
}

/// Shorten on a char boundary.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a scanned book (Gemini flash, rich mode)
  pdf2epub book.pdf -o book.epub

  # Better model for degraded scans
  pdf2epub --model pro book.pdf -o book.epub

  # Plain-text extraction, first 40 pages only
  pdf2epub --mode simple --pages 1-40 book.pdf -o book.epub

  # Continue a run that failed or was interrupted
  pdf2epub --resume book.pdf -o book.epub

  # Inspect PDF metadata (no API key needed)
  pdf2epub --inspect-only book.pdf

RESUMING:
  Every --batch-size pages the run saves <output_dir>/<name>_progress.json
  and a partial <output_dir>/<name>_temp.epub. When a page fails after all
  retries, or on Ctrl-C, progress through the last completed page is saved
  and the process exits non-zero. Re-run the same command with --resume to
  continue; without --resume those files are discarded.

EXIT STATUS:
  0    success
  1    internal error
  2    invalid configuration or provider not configured
  3    input or rasterisation error
  4    extraction failed after all retries (resumable)
  5    malformed model response (resumable)
  6    could not write output or checkpoint
  130  interrupted (resumable)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium if it is not installed system-wide
"#;

/// Convert scanned PDF books to chapterised EPUB using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2epub",
    version,
    about = "Convert scanned PDF books to chapterised EPUB using Vision LLMs",
    long_about = "Convert scanned PDF books to chapterised EPUB. Each page is rendered to an \
image and read by a Vision Language Model; level-1 headings start new chapters. Long runs \
checkpoint their progress and can be resumed after a failure or interruption.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// EPUB output path. Default: the input path with an .epub extension.
    #[arg(short, long, env = "PDF2EPUB_OUTPUT")]
    output: Option<PathBuf>,

    /// Book title. Default: PDF metadata title, then the file name.
    #[arg(long, env = "PDF2EPUB_TITLE")]
    title: Option<String>,

    /// Book author. Default: PDF metadata author, then "Unknown".
    #[arg(long, env = "PDF2EPUB_AUTHOR")]
    author: Option<String>,

    /// Extraction mode: simple (plain text) or rich (typed blocks).
    #[arg(long, env = "PDF2EPUB_MODE", value_enum, default_value = "rich")]
    mode: ModeArg,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2EPUB_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Model: flash, pro, or an explicit model ID.
    #[arg(
        long,
        env = "EDGEQUAKE_MODEL",
        default_value = "flash",
        long_help = "Vision model. `flash` (gemini-2.5-flash) and `pro` (gemini-2.5-pro) are \
          shorthands; any other value is passed to the provider as a model ID."
    )]
    model: String,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2EPUB_PAGES", default_value = "all")]
    pages: String,

    /// Save progress every N processed pages.
    #[arg(long, env = "PDF2EPUB_BATCH_SIZE", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Continue from a matching checkpoint instead of starting over.
    #[arg(long, env = "PDF2EPUB_RESUME")]
    resume: bool,

    /// Attempts per page, first try included.
    #[arg(long, env = "PDF2EPUB_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Base retry delay in seconds; the n-th retry waits n times this.
    #[arg(long, env = "PDF2EPUB_RETRY_DELAY", default_value_t = 5.0)]
    retry_delay: f64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2EPUB_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2EPUB_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Keep table-of-contents pages instead of skipping them.
    #[arg(long, env = "PDF2EPUB_NO_TOC_SKIP")]
    no_toc_skip: bool,

    /// Book language (BCP 47).
    #[arg(long, env = "PDF2EPUB_LANGUAGE", default_value = "zh")]
    language: String,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON summary of the run to stdout.
    #[arg(long, env = "PDF2EPUB_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2EPUB_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2EPUB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2EPUB_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Simple,
    Rich,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Simple => ExtractionMode::Simple,
            ModeArg::Rich => ExtractionMode::Rich,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-page feedback; INFO logs would
    // interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<Pdf2EpubError>())
                .map(Pdf2EpubError::exit_code)
                .unwrap_or(1);
            eprintln!("{} {:#}", red("✘"), err);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        println!("File:    {}", cli.input.display());
        if let Some(ref t) = info.title {
            println!("Title:   {}", t);
        }
        if let Some(ref a) = info.author {
            println!("Author:  {}", a);
        }
        println!("Pages:   {}", info.page_count);
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));

    // ── Ctrl-C stops at the next page boundary ───────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "\n{} Interrupt received; saving progress after the current page…",
                    yellow("⚠")
                );
                cancel.cancel();
            }
        });
    }

    let output = convert_with_cancel(&cli.input, &output_path, &config, cancel)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

fn print_summary(output: &ConversionOutput) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} pages  {} chapters  {}  →  {}",
        green("✔"),
        stats.processed_pages,
        stats.chapters,
        format_millis(stats.total_duration_ms),
        bold(&output.output_path.display().to_string()),
    );
    if let Some(from) = stats.resumed_from {
        eprintln!("   {}", dim(&format!("resumed at page {from}")));
    }
    if let Some(avg) = stats.average_page_ms() {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} per page, {} rendering, {} TOC pages skipped, {} retries",
                format_millis(avg),
                format_millis(stats.render_duration_ms),
                stats.skipped_toc_pages,
                stats.retries
            ))
        );
    }
}

/// `book.pdf` → `book.epub`, next to the input.
fn default_output(input: &Path) -> PathBuf {
    input.with_extension("epub")
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages: PageSelection = cli
        .pages
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Invalid --pages")?;

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .mode(cli.mode.into())
        .provider_name(cli.provider.clone())
        .pages(pages)
        .batch_size(cli.batch_size as usize)
        .resume(cli.resume)
        .max_retries(cli.max_retries)
        .retry_base_delay_ms((cli.retry_delay.max(0.0) * 1000.0) as u64)
        .api_timeout_secs(cli.api_timeout)
        .max_tokens(cli.max_tokens)
        .skip_toc(!cli.no_toc_skip)
        .language(cli.language.clone());

    builder = match cli.model.parse::<ModelTier>() {
        Ok(tier) => builder.model_tier(tier),
        Err(_) => builder.model(cli.model.clone()),
    };
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(ref author) = cli.author {
        builder = builder.author(author.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
