//! Top-level entry points.
//!
//! Every entry point follows the same order: resolve the model backend
//! (failing fast on a missing key), enumerate the inputs, prepare the output
//! destination, then hand everything to a [`BatchDriver`]. Only problems
//! that prevent the batch from starting are returned as `Err`; everything
//! after that ends up in the [`BatchReport`].

use crate::batch::{BatchDriver, CancelFlag};
use crate::config::ExtractionConfig;
use crate::document::SourceFile;
use crate::error::Pdf2CsvError;
use crate::output::BatchReport;
use crate::pipeline::extract::ExtractionClient;
use crate::pipeline::input::{default_output_dir, download_drive_sources, list_local_sources};
use crate::pipeline::split::{PageSplitter, PdfiumSplitter};
use crate::storage::{DriveClient, DriveSink, LocalDirSink, OutputSink};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract every PDF and JPEG in `input_dir` to CSV.
///
/// Outputs go to `output_dir`, or `<input_dir>/csv` when `None`; the
/// directory is created if needed.
///
/// # Errors
/// Returns `Err` only when the batch cannot start:
/// - no API key / provider configured
/// - input directory missing or not a directory
/// - output directory cannot be created
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2csv::{convert_directory, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().api_key("...").build()?;
/// let report = convert_directory("scans", None, &config).await?;
/// eprintln!("{} written, {} failed", report.processed, report.failed);
/// # Ok(())
/// # }
/// ```
pub async fn convert_directory(
    input_dir: impl AsRef<Path>,
    output_dir: Option<&Path>,
    config: &ExtractionConfig,
) -> Result<BatchReport, Pdf2CsvError> {
    convert_directory_with(
        input_dir,
        output_dir,
        config,
        default_splitter(),
        CancelFlag::new(),
    )
    .await
}

/// [`convert_directory`] with an explicit splitter and cancel flag.
pub async fn convert_directory_with(
    input_dir: impl AsRef<Path>,
    output_dir: Option<&Path>,
    config: &ExtractionConfig,
    splitter: Arc<dyn PageSplitter>,
    cancel: CancelFlag,
) -> Result<BatchReport, Pdf2CsvError> {
    let input_dir = input_dir.as_ref();
    let client = ExtractionClient::from_config(config)?;
    let sources = list_local_sources(input_dir)?;
    let output_dir = output_dir.map_or_else(|| default_output_dir(input_dir), Path::to_path_buf);
    let sink = prepare_local_output(&output_dir).await?;

    info!(
        "Processing {} files from {} into {}",
        sources.len(),
        input_dir.display(),
        output_dir.display()
    );
    Ok(run_batch(client, &sources, sink, splitter, cancel, config).await)
}

/// Synchronous wrapper around [`convert_directory`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_directory_sync(
    input_dir: impl AsRef<Path>,
    output_dir: Option<&Path>,
    config: &ExtractionConfig,
) -> Result<BatchReport, Pdf2CsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2CsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_directory(input_dir, output_dir, config))
}

/// Extract a single PDF or JPEG into `output_dir`.
pub async fn convert_file(
    path: impl AsRef<Path>,
    output_dir: &Path,
    config: &ExtractionConfig,
) -> Result<BatchReport, Pdf2CsvError> {
    let path = path.as_ref();
    let client = ExtractionClient::from_config(config)?;
    if !path.is_file() {
        return Err(Pdf2CsvError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let source = SourceFile::from_path(path).ok_or_else(|| {
        Pdf2CsvError::InvalidConfig(format!(
            "'{}' is not a PDF or JPEG file",
            path.display()
        ))
    })?;
    let sink = prepare_local_output(output_dir).await?;
    Ok(run_batch(client, &[source], sink, default_splitter(), CancelFlag::new(), config).await)
}

/// Extract every PDF and JPEG of a Drive folder and upload the CSVs to
/// another Drive folder.
///
/// Sources are downloaded to a temporary directory that is removed when the
/// batch ends. An expired session while listing or downloading is returned
/// as [`Pdf2CsvError::SessionExpired`]; expiry during the batch is recorded
/// per unit (see [`BatchReport::session_expired`]).
pub async fn convert_drive_folder(
    drive: Arc<DriveClient>,
    input_folder_id: &str,
    output_folder_id: &str,
    recursive: bool,
    config: &ExtractionConfig,
) -> Result<BatchReport, Pdf2CsvError> {
    convert_drive_folder_with(
        drive,
        input_folder_id,
        output_folder_id,
        recursive,
        config,
        default_splitter(),
        CancelFlag::new(),
    )
    .await
}

/// [`convert_drive_folder`] with an explicit splitter and cancel flag.
pub async fn convert_drive_folder_with(
    drive: Arc<DriveClient>,
    input_folder_id: &str,
    output_folder_id: &str,
    recursive: bool,
    config: &ExtractionConfig,
    splitter: Arc<dyn PageSplitter>,
    cancel: CancelFlag,
) -> Result<BatchReport, Pdf2CsvError> {
    let client = ExtractionClient::from_config(config)?;
    let input = download_drive_sources(&drive, input_folder_id, recursive).await?;
    let sink: Arc<dyn OutputSink> = Arc::new(DriveSink::new(drive, output_folder_id));
    // `input` owns the temp directory; keep it alive until the batch ends.
    let report = run_batch(client, &input.sources, sink, splitter, cancel, config).await;
    drop(input);
    Ok(report)
}

/// Run a batch over an explicit worklist and destination.
///
/// The most general entry point: callers choose the splitter, the sink and
/// the cancel flag. Used by the CLI and by tests.
pub async fn convert_sources(
    sources: &[SourceFile],
    sink: Arc<dyn OutputSink>,
    splitter: Arc<dyn PageSplitter>,
    cancel: CancelFlag,
    config: &ExtractionConfig,
) -> Result<BatchReport, Pdf2CsvError> {
    let client = ExtractionClient::from_config(config)?;
    Ok(run_batch(client, sources, sink, splitter, cancel, config).await)
}

/// Create `dir` and wrap it as a sink.
pub async fn prepare_local_output(dir: &Path) -> Result<Arc<dyn OutputSink>, Pdf2CsvError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Pdf2CsvError::OutputDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
    Ok(Arc::new(LocalDirSink::new(dir)))
}

fn default_splitter() -> Arc<dyn PageSplitter> {
    Arc::new(PdfiumSplitter::new())
}

async fn run_batch(
    client: ExtractionClient,
    sources: &[SourceFile],
    sink: Arc<dyn OutputSink>,
    splitter: Arc<dyn PageSplitter>,
    cancel: CancelFlag,
    config: &ExtractionConfig,
) -> BatchReport {
    BatchDriver::new(client, splitter, sink, config)
        .with_cancel_flag(cancel)
        .run(sources)
        .await
}
