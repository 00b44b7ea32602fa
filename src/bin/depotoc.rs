//! CLI binary for depo-toc.
//!
//! A thin shim over the library crate that maps CLI flags to `TocConfig`,
//! runs the pipeline and writes the table of contents next to `--out`.

use anyhow::{Context, Result};
use clap::Parser;
use depo_toc::{
    build_toc, inspect, write_output, CancelHandle, ConsolidationMode, DocumentSummary,
    ExportFormat, PageNumbering, PageSelection, PhraseMarker, ProgressCallback, TocConfig,
    TocProgressCallback, WriteOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished unit. Units may finish
/// out of order in batch mode.
struct CliProgressCallback {
    bar: ProgressBar,
    /// "window" or "page".
    unit_noun: &'static str,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(mode: ConsolidationMode) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading transcript…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unit_noun: match mode {
                ConsolidationMode::Batch => "window",
                ConsolidationMode::Streaming => "page",
            },
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_ms(&self, unit: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&unit))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl TocProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_units: usize) {
        let progress_style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}s  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}",
            self.unit_noun
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_units as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Indexing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Classifying {total_units} {}s…", self.unit_noun))
        ));
    }

    fn on_unit_start(&self, unit: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(unit, Instant::now());
        }
        self.bar.set_message(format!("{} {}", self.unit_noun, unit + 1));
    }

    fn on_unit_complete(&self, unit: usize, total: usize, candidates: usize) {
        let elapsed_ms = self.elapsed_ms(unit);
        self.bar.println(format!(
            "  {} {} {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            self.unit_noun,
            unit + 1,
            total,
            dim(&format!("{candidates:>3} topics")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit: usize, total: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(unit);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            self.unit_noun,
            unit + 1,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_units: usize, entries: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} {}s classified, {} topics",
                green("✔"),
                bold(&total_units.to_string()),
                self.unit_noun,
                bold(&entries.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} {}s classified  ({} failed), {} topics",
                if failed == total_units {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                total_units.saturating_sub(failed),
                total_units,
                self.unit_noun,
                red(&failed.to_string()),
                bold(&entries.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Table of contents as JSON + Word + Markdown (yu-depo.json, yu-depo.docx, yu-depo.md)
  depotoc yu-depo.pdf --out yu-depo

  # JSON and a plain-text listing only
  depotoc yu-depo.pdf --out toc/yu --format json,txt

  # Page-by-page mode with a budget of 40 oracle calls
  depotoc --mode streaming --page-budget 40 yu-depo.pdf --out yu

  # Smaller windows with more overlap
  depotoc --window-size 6 --stride 4 yu-depo.pdf --out yu

  # Use the page numbers printed on the transcript
  depotoc --printed-page-numbers yu-depo.pdf --out yu

  # Plain-text transcript, pages separated by form feeds
  depotoc transcript.txt --out transcript

  # See pages, terminal page and windows without calling the oracle
  depotoc --inspect-only yu-depo.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise the system library path is searched)
  RUST_LOG                Log filter, e.g. depo_toc=debug
"#;

/// Build a table of contents for deposition transcripts.
#[derive(Parser, Debug)]
#[command(
    name = "depotoc",
    version,
    about = "Build a page/line table of contents for deposition transcripts using an LLM",
    long_about = "Reads a deposition transcript (PDF, form-feed separated text, or URL), \
normalises every page while keeping its 1-25 line numbers, asks an LLM where each topic \
of testimony begins, and writes the validated table of contents as JSON, Word, Markdown or text.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Transcript file (PDF or .txt) or HTTP/HTTPS URL.
    input: String,

    /// Output base name; each format adds its own extension.
    #[arg(
        short,
        long,
        env = "DEPOTOC_OUT",
        required_unless_present = "inspect_only"
    )]
    out: Option<PathBuf>,

    /// Output formats: json, docx, md, txt (comma separated).
    #[arg(
        long,
        env = "DEPOTOC_FORMAT",
        value_delimiter = ',',
        default_value = "json,docx,md"
    )]
    format: Vec<ExportFormat>,

    /// Consolidation mode.
    #[arg(long, env = "DEPOTOC_MODE", value_enum, default_value = "batch")]
    mode: ModeArg,

    /// Pages per window (batch mode).
    #[arg(long, env = "DEPOTOC_WINDOW_SIZE", default_value_t = 8)]
    window_size: usize,

    /// Pages between window starts; must be smaller than --window-size.
    #[arg(long, env = "DEPOTOC_STRIDE", default_value_t = 7)]
    stride: usize,

    /// Number of concurrent oracle calls (batch mode).
    #[arg(short, long, env = "DEPOTOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DEPOTOC_PAGES", default_value = "all")]
    pages: String,

    /// Number pages by their printed "Page N" label instead of position.
    #[arg(long, env = "DEPOTOC_PRINTED_PAGE_NUMBERS")]
    printed_page_numbers: bool,

    /// Phrase marking the last page of testimony (repeatable).
    #[arg(long = "end-marker", value_name = "PHRASE")]
    end_markers: Vec<String>,

    /// Delay between oracle calls in streaming mode, in milliseconds.
    #[arg(long, env = "DEPOTOC_CALL_DELAY_MS", default_value_t = 1000)]
    call_delay_ms: u64,

    /// Maximum oracle calls in streaming mode.
    #[arg(long, env = "DEPOTOC_PAGE_BUDGET")]
    page_budget: Option<usize>,

    /// Retries per unit on oracle failure.
    #[arg(long, env = "DEPOTOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DEPOTOC_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DEPOTOC_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DEPOTOC_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DEPOTOC_PASSWORD")]
    password: Option<String>,

    /// Print page and window layout only, no oracle calls.
    #[arg(long)]
    inspect_only: bool,

    /// Print the full run result (entries, units, stats) as JSON on stdout.
    #[arg(long, env = "DEPOTOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DEPOTOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DEPOTOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DEPOTOC_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DEPOTOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call oracle timeout in seconds.
    #[arg(long, env = "DEPOTOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Batch,
    Streaming,
}

impl From<ModeArg> for ConsolidationMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Batch => ConsolidationMode::Batch,
            ModeArg::Streaming => ConsolidationMode::Streaming,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
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

    // ── Build config ─────────────────────────────────────────────────────
    let mode: ConsolidationMode = cli.mode.into();
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new(mode) as Arc<dyn TocProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect transcript")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else {
            print_summary(&cli.input, &summary);
        }
        return Ok(());
    }

    // ── Ctrl-C stops at the next unit boundary ───────────────────────────
    let cancel = config.cancel.clone();
    let quiet = cli.quiet;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !quiet {
                eprintln!("{} Interrupted; finishing with the topics found so far", cyan("⚠"));
            }
            cancel.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let output = build_toc(&cli.input, &config)
        .await
        .context("Table of contents generation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    let Some(ref base) = cli.out else {
        return Ok(());
    };
    let outcome = write_output(&output, base, &cli.format)
        .await
        .context("Failed to write table of contents")?;

    match outcome {
        WriteOutcome::Empty { .. } => {
            if !cli.quiet {
                println!("No topics were generated; no files written.");
            }
        }
        WriteOutcome::Written { paths, stats } => {
            if !cli.quiet {
                eprintln!(
                    "{}  {} topics  {}/{} units ok  {}ms",
                    if stats.failed_units == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    stats.entries,
                    stats.units.saturating_sub(stats.failed_units),
                    stats.units,
                    stats.total_duration_ms,
                );
                for path in &paths {
                    eprintln!("   →  {}", bold(&path.display().to_string()));
                }
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&stats.total_input_tokens.to_string()),
                    dim(&stats.total_output_tokens.to_string()),
                );
                if !stats.uncovered_pages.is_empty() {
                    eprintln!(
                        "   {} pages {:?} fall after the last full window and were not analysed",
                        cyan("⚠"),
                        stats.uncovered_pages
                    );
                }
                if stats.stopped_early {
                    eprintln!("   {} run stopped early; table is partial", cyan("⚠"));
                }
            }
        }
    }

    Ok(())
}

fn print_summary(input: &str, s: &DocumentSummary) {
    println!("File:            {}", input);
    println!("Pages:           {}", s.source_pages);
    println!("Text pages:      {}", s.text_pages);
    if !s.skipped_pages.is_empty() {
        println!("Skipped pages:   {:?}", s.skipped_pages);
    }
    match s.terminal_page {
        Some(p) => println!(
            "Terminal page:   {} ({} pages after it ignored)",
            p, s.pages_after_terminal
        ),
        None => println!("Terminal page:   none"),
    }
    println!("Windows:         {}", s.windows.len());
    for w in &s.windows {
        println!("  #{:<3} pages {}-{}", w.index, w.first_page, w.last_page);
    }
    if !s.uncovered_pages.is_empty() {
        println!("Uncovered pages: {:?}", s.uncovered_pages);
    }
}

/// Map CLI args to `TocConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TocConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let pages = parse_pages(&cli.pages)?;

    let mut builder = TocConfig::builder()
        .mode(cli.mode.into())
        .window_size(cli.window_size)
        .stride(cli.stride)
        .concurrency(cli.concurrency)
        .pages(pages)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .call_delay_ms(cli.call_delay_ms)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .cancel(CancelHandle::new());

    if cli.printed_page_numbers {
        builder = builder.page_numbering(PageNumbering::Printed);
    }
    if !cli.end_markers.is_empty() {
        builder = builder.terminal_marker(Arc::new(PhraseMarker::new(cli.end_markers.clone())));
    }
    if let Some(budget) = cli.page_budget {
        builder = builder.page_budget(budget);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
