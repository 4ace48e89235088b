//! CLI binary for slide-digest.
//!
//! A thin shim over the library crate that maps CLI flags to `DigestConfig`,
//! opens the browser, runs the batch and prints the summaries.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use slide_digest::browser::{WebDriverConfig, WebDriverSession};
use slide_digest::listing::collect_talk_links;
use slide_digest::{
    BrowserSession, DigestConfig, DigestProgressCallback, LlmBackend, Pipeline, ProgressCallback,
    SummaryMode, TextSource,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        format!("{}\u{2026}", msg.chars().take(max - 1).collect::<String>())
    } else {
        msg.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar per talk: a spinner while the page loads, then a slide counter.
/// Summary completions arrive out of order from the worker pool and are
/// printed above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_summaries: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed_summaries: AtomicUsize::new(0),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn slide_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }
}

impl DigestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_talks: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Digesting {total_talks} talk(s)…"))
        ));
    }

    fn on_talk_start(&self, talk_num: usize, url: &str) {
        self.bar.set_style(Self::spinner_style());
        self.bar.set_prefix(format!("Talk {talk_num}"));
        self.bar.set_message(format!("loading {url}"));
        self.bar.set_position(0);
    }

    fn on_deck_discovered(&self, _url: &str, total_slides: usize) {
        self.bar.set_length(total_slides as u64);
        self.bar.set_style(Self::slide_style());
        self.bar.set_message("");
        self.bar.reset_elapsed();
    }

    fn on_slide_captured(&self, slide: usize, _total_slides: usize, from_cache: bool) {
        self.bar.set_position(slide as u64);
        if from_cache {
            self.bar.set_message(dim("cached"));
        } else {
            self.bar.set_message("");
        }
    }

    fn on_summary_complete(&self, key: &str, ok: bool) {
        if ok {
            self.bar
                .println(format!("  {} summary {}", green("✓"), dim(key)));
        } else {
            self.failed_summaries.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!("  {} summary {}", red("✗"), key));
        }
    }

    fn on_talk_complete(&self, talk_num: usize, url: &str, summaries: usize) {
        self.bar.println(format!(
            "{} Talk {:>3}  {}  {}",
            green("✔"),
            talk_num,
            dim(&format!("{summaries} summaries")),
            dim(url),
        ));
    }

    fn on_talk_error(&self, talk_num: usize, url: &str, error: &str) {
        self.bar.println(format!(
            "{} Talk {:>3}  {}  {}",
            red("✘"),
            talk_num,
            red(&truncate(error, 80)),
            dim(url),
        ));
    }

    fn on_batch_complete(&self, total_talks: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = total_talks.saturating_sub(succeeded);
        let failed_summaries = self.failed_summaries.load(Ordering::SeqCst);
        if failed == 0 && failed_summaries == 0 {
            eprintln!(
                "{} {} talk(s) digested",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} talks digested  ({} failed, {} summaries failed)",
                if failed == total_talks { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_talks,
                red(&failed.to_string()),
                red(&failed_summaries.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One oral talk
  slidedigest --mode talk https://iclr.cc/virtual/2025/oral/31

  # A workshop recording, split on cover slides (default mode)
  slidedigest https://iclr.cc/virtual/2025/workshop/23

  # Every oral talk linked from a program page, appended to a file
  slidedigest --mode talk --listing https://iclr.cc/virtual/2025/events/oral \
      --link-filter /virtual/2025/oral/ --summaries-file summaries.txt

  # Fast per-slide summaries with local OCR
  slidedigest --mode per-slide --text-source ocr https://iclr.cc/virtual/2025/oral/31

SETUP:
  1. Start a driver:  chromedriver --port=9515
  2. Set an API key:  export ANTHROPIC_API_KEY=sk-...
  3. Run:             slidedigest <URL>

  --text-source ocr needs the `tesseract` binary on PATH.
  Slide text, classifications and summaries are cached per URL under
  --cache-dir; a second run over the same URL makes no model calls.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Walk conference slide decks in a browser and summarise them.
#[derive(Parser, Debug)]
#[command(
    name = "slidedigest",
    version,
    about = "Walk conference slide decks in a browser and summarise them with Vision LLMs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Talk page URLs.
    urls: Vec<String>,

    /// Program page to collect talk links from (`a.small-title` anchors).
    #[arg(long, env = "SLIDEDIGEST_LISTING")]
    listing: Option<String>,

    /// Keep only listing links containing this fragment (e.g. /virtual/2025/oral/).
    #[arg(long, env = "SLIDEDIGEST_LINK_FILTER", requires = "listing")]
    link_filter: Option<String>,

    /// How slides become summaries.
    #[arg(long, env = "SLIDEDIGEST_MODE", value_enum, default_value = "workshop")]
    mode: ModeArg,

    /// Where slide text comes from.
    #[arg(long, env = "SLIDEDIGEST_TEXT_SOURCE", value_enum, default_value = "vision")]
    text_source: TextSourceArg,

    /// Directory for per-URL cache files.
    #[arg(long, env = "SLIDEDIGEST_CACHE_DIR", default_value = ".cache")]
    cache_dir: PathBuf,

    /// Append each completed talk's summary to this file.
    #[arg(long, env = "SLIDEDIGEST_SUMMARIES_FILE")]
    summaries_file: Option<PathBuf>,

    /// WebDriver endpoint (chromedriver).
    #[arg(long, env = "SLIDEDIGEST_WEBDRIVER_URL", default_value = "http://localhost:9515")]
    webdriver_url: String,

    /// Run Chrome without a window.
    #[arg(long, env = "SLIDEDIGEST_HEADLESS")]
    headless: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. claude-sonnet-4-20250514, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Concurrent summary calls.
    #[arg(short, long, env = "SLIDEDIGEST_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Stop each deck after this many slides.
    #[arg(long, env = "SLIDEDIGEST_MAX_SLIDES",
          value_parser = clap::value_parser!(u64).range(1..))]
    max_slides: Option<u64>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "SLIDEDIGEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "SLIDEDIGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLIDEDIGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and summaries.
    #[arg(short, long, env = "SLIDEDIGEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Oral talk: one summary per page.
    Talk,
    /// Invited talk: one summary per page, naming speaker and title.
    Invited,
    /// Multi-talk recording split on cover slides.
    Workshop,
    /// One summary per slide.
    PerSlide,
}

impl From<ModeArg> for SummaryMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Talk => SummaryMode::Talk {
                include_attribution: false,
            },
            ModeArg::Invited => SummaryMode::Talk {
                include_attribution: true,
            },
            ModeArg::Workshop => SummaryMode::Workshop,
            ModeArg::PerSlide => SummaryMode::PerSlide,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TextSourceArg {
    Vision,
    Ocr,
}

impl From<TextSourceArg> for TextSource {
    fn from(v: TextSourceArg) -> Self {
        match v {
            TextSourceArg::Vision => TextSource::Vision,
            TextSourceArg::Ocr => TextSource::Ocr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.urls.is_empty() && cli.listing.is_none() {
        let mut cmd = Cli::command();
        cmd.print_help().ok();
        println!();
        std::process::exit(1);
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build config and backend ─────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DigestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let backend = LlmBackend::from_config(&config).context("LLM provider setup failed")?;

    // ── Open browser ─────────────────────────────────────────────────────
    let driver_config = WebDriverConfig {
        url: cli.webdriver_url.clone(),
        headless: cli.headless,
        ..Default::default()
    };
    let browser = Arc::new(
        WebDriverSession::open(&driver_config)
            .await
            .with_context(|| format!("Could not start a browser via {}", cli.webdriver_url))?,
    );

    // The browser is closed on every path out of the batch.
    let outcome = run(&cli, Arc::clone(&browser), Arc::new(backend), config).await;
    if let Err(e) = browser.close().await {
        tracing::warn!("Browser did not close cleanly: {}", e);
    }
    let (text, total, succeeded) = outcome?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }

    if total > 0 && succeeded == 0 {
        anyhow::bail!("All {total} talk(s) failed");
    }
    Ok(())
}

/// Collect URLs and run the batch. Returns (rendered text, talks, succeeded).
async fn run(
    cli: &Cli,
    browser: Arc<WebDriverSession>,
    backend: Arc<LlmBackend>,
    config: DigestConfig,
) -> Result<(String, usize, usize)> {
    let mut urls = cli.urls.clone();
    if let Some(ref listing) = cli.listing {
        let links = collect_talk_links(browser.as_ref(), listing, cli.link_filter.as_deref())
            .await
            .with_context(|| format!("Could not read talk links from {listing}"))?;
        for link in links {
            if !urls.contains(&link) {
                urls.push(link);
            }
        }
    }
    if !cli.quiet {
        eprintln!("{} {} talk URL(s) queued", dim("·"), urls.len());
    }

    let mode = config.mode;
    let pipeline = Pipeline::new(browser as Arc<dyn BrowserSession>, backend, config);
    let report = pipeline.run_batch(&urls).await;
    Ok((report.render(mode), report.talks.len(), report.succeeded()))
}

/// Map CLI args to `DigestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DigestConfig> {
    let mut builder = DigestConfig::builder()
        .mode(cli.mode.into())
        .text_source(cli.text_source.into())
        .concurrency(cli.concurrency)
        .cache_dir(cli.cache_dir.clone())
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.summaries_file {
        builder = builder.summaries_file(path.clone());
    }
    if let Some(n) = cli.max_slides {
        builder = builder.max_slides(n as usize);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
