//! CLI binary for edgequake-pdf2csv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one batch and prints a summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2csv::pipeline::input::default_output_dir;
use edgequake_pdf2csv::{
    convert_directory_with, convert_drive_folder_with, BatchProgressCallback, BatchReport,
    CancelFlag, DriveClient, ExtractionConfig, ModelTier, NamingStrategy, PdfiumSplitter,
    ProgressCallback, PromptVersion,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar for the whole batch plus a log line per unit.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Counting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize, total_units: usize) {
        self.activate_bar(total_units);
        self.bar.println(bold(&format!(
            "◆ {total_files} files, {total_units} pages to check…"
        )));
    }

    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        self.bar
            .set_message(format!("{name} ({}/{total_files})", index + 1));
    }

    fn on_unit_complete(&self, done: usize, _total: usize, label: &str, location: &str) {
        self.bar
            .println(format!("  {} {:<32} → {}", green("✓"), label, dim(location)));
        self.bar.set_position(done as u64);
    }

    fn on_unit_skipped(&self, done: usize, _total: usize, label: &str) {
        self.bar
            .println(format!("  {} {:<32} {}", dim("·"), label, dim("exists")));
        self.bar.set_position(done as u64);
    }

    fn on_unit_error(&self, done: usize, _total: usize, label: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<32} {}", red("✗"), label, red(&msg)));
        self.bar.set_position(done as u64);
    }

    fn on_rate_limited(&self, label: &str, attempt: u32, wait_secs: u64) {
        self.bar.println(format!(
            "  {} {:<32} rate limited (attempt {attempt}), retrying in {wait_secs}s",
            yellow("⏸"),
            label
        ));
    }

    fn on_batch_complete(&self, _processed: usize, _skipped: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every PDF/JPEG in ./scans into ./scans/csv
  pdf2csv scans

  # Custom output directory, higher-accuracy model
  pdf2csv scans -o tables --accurate

  # Put collection date and station code in file names
  pdf2csv scans --naming metadata

  # Machine-readable report
  pdf2csv scans --json > report.json

  # Google Drive: folder in, folder out
  pdf2csv --drive-input <FOLDER_ID> --drive-output <FOLDER_ID> --drive-token "$TOKEN"

  # Browse Drive folders
  pdf2csv --list-drive-folders --drive-parent root

OUTPUT NAMES:
  report.pdf  →  report_page1.csv, report_page2.csv, …
  scan.jpg    →  scan.csv
  Existing outputs are never overwritten; re-running only processes what is missing.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY              Gemini API key
  GOOGLE_DRIVE_ACCESS_TOKEN   OAuth access token for Drive mode
  PDFIUM_LIB_PATH             Path to libpdfium (file or directory)
  RUST_LOG                    Log filter, e.g. edgequake_pdf2csv=debug
"#;

/// Extract tables from scanned PDF and JPEG documents to CSV.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2csv",
    version,
    about = "Extract tables from scanned PDF and JPEG documents to CSV",
    long_about = "Extract tabular data from scanned PDF and JPEG documents into CSV files using a \
hosted vision model (Gemini by default). Each PDF page becomes its own CSV; existing outputs are \
skipped so interrupted batches can simply be re-run.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing .pdf / .jpg / .jpeg files.
    input: Option<PathBuf>,

    /// Output directory. Default: <INPUT>/csv.
    #[arg(short, long, env = "PDF2CSV_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID (e.g. gemini-1.5-flash, gemini-1.5-pro).
    #[arg(long, env = "PDF2CSV_MODEL")]
    model: Option<String>,

    /// Use the higher-accuracy model tier (gemini-1.5-pro).
    #[arg(long, conflicts_with = "model")]
    accurate: bool,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Route extraction through an edgequake-llm provider instead of Gemini.
    #[arg(
        long,
        env = "PDF2CSV_PROVIDER",
        long_help = "edgequake-llm provider name (openai, anthropic, gemini, ollama, …).\n\
          The provider reads its own API key from the environment."
    )]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDF2CSV_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per page.
    #[arg(long, env = "PDF2CSV_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Attempts per page when rate limited.
    #[arg(long, env = "PDF2CSV_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Pause between model calls, in milliseconds.
    #[arg(long, env = "PDF2CSV_ITEM_DELAY_MS", default_value_t = 1000)]
    item_delay_ms: u64,

    /// How output files are named.
    #[arg(long, env = "PDF2CSV_NAMING", value_enum, default_value = "source")]
    naming: NamingArg,

    /// Built-in prompt version.
    #[arg(long, env = "PDF2CSV_PROMPT_VERSION", value_enum, default_value = "v2")]
    prompt_version: PromptArg,

    /// Text file with a custom prompt ({document_type} and {page_info} are substituted).
    #[arg(long, env = "PDF2CSV_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "PDF2CSV_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "PDF2CSV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2CSV_QUIET")]
    quiet: bool,

    // ── Google Drive ─────────────────────────────────────────────────────
    /// Drive folder ID to read sources from.
    #[arg(long, requires = "drive_output", conflicts_with = "input")]
    drive_input: Option<String>,

    /// Drive folder ID to upload CSVs to.
    #[arg(long, requires = "drive_input")]
    drive_output: Option<String>,

    /// Include files in nested Drive folders.
    #[arg(long)]
    drive_recursive: bool,

    /// OAuth access token for Google Drive.
    #[arg(long, env = "GOOGLE_DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    drive_token: Option<String>,

    /// List Drive folders (under --drive-parent if given) and exit.
    #[arg(long)]
    list_drive_folders: bool,

    /// Parent folder ID for --list-drive-folders and --create-drive-folder.
    #[arg(long)]
    drive_parent: Option<String>,

    /// Create a Drive folder path (e.g. "results/2024") and print its ID.
    #[arg(long)]
    create_drive_folder: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum NamingArg {
    Source,
    Metadata,
}

impl From<NamingArg> for NamingStrategy {
    fn from(v: NamingArg) -> Self {
        match v {
            NamingArg::Source => NamingStrategy::SourceName,
            NamingArg::Metadata => NamingStrategy::WithMetadata,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PromptArg {
    V1,
    V2,
}

impl From<PromptArg> for PromptVersion {
    fn from(v: PromptArg) -> Self {
        match v {
            PromptArg::V1 => PromptVersion::V1,
            PromptArg::V2 => PromptVersion::V2,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Drive helpers ────────────────────────────────────────────────────
    if cli.list_drive_folders || cli.create_drive_folder.is_some() {
        return drive_helpers(&cli).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // Ctrl-C finishes the current unit, then stops with a partial report.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} stopping after the current page…", yellow("⏸"));
                cancel.cancel();
            }
        });
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let splitter = Arc::new(PdfiumSplitter::new());
    let (report, destination) = if let Some(input_id) = &cli.drive_input {
        let output_id = cli
            .drive_output
            .as_deref()
            .context("--drive-output is required with --drive-input")?;
        let drive = Arc::new(drive_client(&cli)?);
        let report = convert_drive_folder_with(
            drive,
            input_id,
            output_id,
            cli.drive_recursive,
            &config,
            splitter,
            cancel,
        )
        .await
        .context("Batch failed")?;
        (report, format!("drive://{output_id}"))
    } else {
        let Some(input) = &cli.input else {
            bail!("An input directory or --drive-input is required");
        };
        let output_dir = cli.output.clone().unwrap_or_else(|| default_output_dir(input));
        let report =
            convert_directory_with(input, Some(&output_dir), &config, splitter, cancel)
                .await
                .context("Batch failed")?;
        (report, output_dir.display().to_string())
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }
    if !cli.quiet {
        print_summary(&report, &destination);
    }
    Ok(())
}

fn print_summary(report: &BatchReport, destination: &str) {
    let mark = if report.failed == 0 {
        green("✔")
    } else if report.processed + report.skipped == 0 {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{mark}  {} written, {} skipped, {} failed  {}  →  {}",
        bold(&report.processed.to_string()),
        report.skipped,
        if report.failed > 0 {
            red(&report.failed.to_string())
        } else {
            report.failed.to_string()
        },
        dim(&format!("{:.1}s", report.total_duration_ms as f64 / 1000.0)),
        bold(destination),
    );
    if report.cancelled {
        eprintln!("   {}", yellow("cancelled before all pages were processed"));
    }
    if report.session_expired() {
        eprintln!(
            "   {}",
            red("Google Drive session expired. Refresh the access token and re-run.")
        );
    }
}

fn drive_client(cli: &Cli) -> Result<DriveClient> {
    let token = cli
        .drive_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .context("A Drive access token is required (--drive-token or GOOGLE_DRIVE_ACCESS_TOKEN)")?;
    DriveClient::new(token).context("Failed to create Drive client")
}

async fn drive_helpers(cli: &Cli) -> Result<()> {
    let drive = drive_client(cli)?;
    if let Some(path) = &cli.create_drive_folder {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let id = drive
            .create_folder_path(&parts, cli.drive_parent.as_deref())
            .await
            .context("Failed to create Drive folder")?
            .context("Empty folder path")?;
        println!("{id}");
        return Ok(());
    }

    let folders = drive
        .list_folders(cli.drive_parent.as_deref())
        .await
        .context("Failed to list Drive folders")?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&folders).context("Failed to serialise folders")?
        );
    } else {
        for folder in folders {
            println!("{}  {}", folder.id, folder.name);
        }
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .max_attempts(cli.max_attempts)
        .item_delay(Duration::from_millis(cli.item_delay_ms))
        .api_timeout_secs(cli.api_timeout)
        .naming(cli.naming.clone().into())
        .prompt_version(cli.prompt_version.clone().into());

    if cli.accurate {
        builder = builder.model_tier(ModelTier::Accurate);
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(path) = &cli.prompt_file {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt_template(template);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
