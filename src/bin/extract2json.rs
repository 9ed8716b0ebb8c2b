//! CLI binary for extract2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the resulting JSON record.

use anyhow::{Context, Result};
use clap::Parser;
use extract2json::{
    extract, extract_to_file, ExtractionConfig, ExtractionProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

/// Terminal progress callback: renders a live progress bar and per-unit log
/// lines using [indicatif]. Designed to work correctly when units complete
/// out-of-order (concurrent extraction).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-unit wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of units that errored out.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically by
    /// `on_run_start` (called after splitting, before any unit runs).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        // Initial style: spinner only (no counter until the split is done).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Splitting input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_units: usize) {
        // Switch from spinner-only style to the full progress bar now that
        // the unit count is known.
        self.activate_bar(total_units);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_units} units…"))
        ));
    }

    fn on_unit_start(&self, unit_index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(unit_index, Instant::now());
        self.bar.set_message(format!("unit {}", unit_index + 1));
    }

    fn on_unit_complete(&self, unit_index: usize, total: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&unit_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {}",
            green("✓"),
            unit_index + 1,
            total,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit_index: usize, total: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&unit_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {}  {}",
            red("✗"),
            unit_index + 1,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_units: usize, success_count: usize) {
        let failed = total_units.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} units extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} units extracted  ({} failed)",
                if failed == total_units {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_units,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a PDF to JSON (stdout)
  extract2json report.pdf

  # Extract to a file
  extract2json report.pdf -o report.json

  # A folder of screenshots
  extract2json ./screenshots/ -o shots.json

  # Transcribe a recording
  extract2json meeting.wav -o meeting.json

  # Fetch a web page
  extract2json https://example.com/article -o article.json

  # Pick other local models
  extract2json --vision-model llama3.2-vision --text-model qwen3:8b slides.pptx

  # Skip the consolidation pass
  extract2json --no-consolidate report.pdf

SUPPORTED INPUTS:
  Kind        Extensions / shape
  ─────────   ──────────────────────────────────────
  document    .pdf .docx .pptx   (pdftoppm; office formats via libreoffice)
  image       .png .jpg .jpeg
  images_dir  a directory containing image files
  audio       .wav .mp3          (whisper-server)
  url         http:// or https://

LOCAL SERVERS:
  Ollama          http://localhost:11434   (vision + text models)
  whisper-server  http://localhost:8080    (audio transcription)

ENVIRONMENT VARIABLES:
  EXTRACT2JSON_BACKEND_URL      Model backend base URL
  EXTRACT2JSON_VISION_MODEL     Vision model ID
  EXTRACT2JSON_TEXT_MODEL       Consolidation model ID
  EXTRACT2JSON_TRANSCRIBER_URL  whisper-server base URL

SETUP:
  1. Start Ollama:   ollama serve && ollama pull qwen3-vl:4b
  2. Extract:        extract2json document.pdf -o output.json
"#;

/// Extract structured JSON from documents, images, audio, and web pages.
#[derive(Parser, Debug)]
#[command(
    name = "extract2json",
    version,
    about = "Extract structured JSON from documents, images, audio, and web pages",
    long_about = "Extract structured JSON from heterogeneous inputs (PDF/Office documents, \
images, image directories, audio recordings, web pages) using local model servers. \
Documents are split into page images and read by a vision model; audio goes through \
whisper-server; everything ends up as one stable JSON record.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path, directory of images, or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON record to this file instead of stdout.
    #[arg(short, long, env = "EXTRACT2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Model backend base URL (Ollama-compatible).
    #[arg(
        long,
        env = "EXTRACT2JSON_BACKEND_URL",
        default_value = "http://localhost:11434"
    )]
    backend_url: String,

    /// Vision model for per-unit extraction.
    #[arg(
        long,
        env = "EXTRACT2JSON_VISION_MODEL",
        default_value = "qwen3-vl:4b"
    )]
    vision_model: String,

    /// Text model for the consolidation pass.
    #[arg(long, env = "EXTRACT2JSON_TEXT_MODEL", default_value = "llama3.2")]
    text_model: String,

    /// whisper-server base URL for audio inputs.
    #[arg(
        long,
        env = "EXTRACT2JSON_TRANSCRIBER_URL",
        default_value = "http://localhost:8080"
    )]
    transcriber_url: String,

    /// Number of units extracted concurrently.
    #[arg(short, long, env = "EXTRACT2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Maximum backend calls in flight across all units.
    #[arg(long, env = "EXTRACT2JSON_MAX_BACKEND_CALLS", default_value_t = 4)]
    max_backend_calls: usize,

    /// Per-backend-call timeout in seconds.
    #[arg(long, env = "EXTRACT2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries per backend call on transient failure.
    #[arg(long, env = "EXTRACT2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Skip the consolidation pass entirely.
    #[arg(long, env = "EXTRACT2JSON_NO_CONSOLIDATE")]
    no_consolidate: bool,

    /// Also consolidate single-image and image-directory inputs.
    #[arg(long, env = "EXTRACT2JSON_CONSOLIDATE_IMAGES")]
    consolidate_images: bool,

    /// URL fetch timeout in seconds.
    #[arg(long, env = "EXTRACT2JSON_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "EXTRACT2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXTRACT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the record itself.
    #[arg(short, long, env = "EXTRACT2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .backend_url(&cli.backend_url)
        .vision_model(&cli.vision_model)
        .text_model(&cli.text_model)
        .transcriber_url(&cli.transcriber_url)
        .concurrency(cli.concurrency)
        .max_backend_calls(cli.max_backend_calls)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .fetch_timeout_secs(cli.fetch_timeout)
        .consolidate_documents(!cli.no_consolidate)
        .consolidate_images(cli.consolidate_images && !cli.no_consolidate)
        .consolidate_directories(cli.consolidate_images && !cli.no_consolidate);

    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;

    // ── Run extraction ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let output = extract_to_file(&cli.input, output_path, &config)
            .await
            .context("Extraction failed")?;

        // Summary line (the callback already printed the per-unit log).
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} units  {}ms  →  {}",
                if output.stats.failed_units == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.stats.extracted_units,
                output.stats.total_units,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let output = extract(&cli.input, &config)
            .await
            .context("Extraction failed")?;

        let json = serde_json::to_string_pretty(&output.record)
            .context("Failed to serialise record")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;
        handle.write_all(b"\n").ok();

        if !cli.quiet && !show_progress {
            // Only print inline stats when the progress callback is disabled.
            eprintln!(
                "Extracted {}/{} units in {}ms",
                output.stats.extracted_units,
                output.stats.total_units,
                output.stats.total_duration_ms
            );
            if output.stats.failed_units > 0 {
                eprintln!("  {} units failed", output.stats.failed_units);
            }
        }
    }

    Ok(())
}
