//! # edgequake-pdf2csv
//!
//! Extract tables from scanned PDF and JPEG documents into CSV using a
//! hosted generative vision model (Gemini by default).
//!
//! Field sheets, lab reports and monitoring logs often exist only as scans.
//! OCR tools recover the characters but lose the grid. This crate instead
//! sends each page to a vision model with a strict CSV contract and writes
//! one CSV per page, skipping anything a previous run already produced.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory / Drive folder
//!  │
//!  ├─ 1. Input     list *.pdf / *.jpg / *.jpeg (Drive: download to a temp dir)
//!  ├─ 2. Split     one single-page PDF per page via pdfium (spawn_blocking)
//!  ├─ 3. Encode    base64 payload + MIME type
//!  ├─ 4. Extract   model call, rate-limit retry (60–120 s, 3 attempts)
//!  ├─ 5. Sanitize  strip code fences, parse the #METADATA line
//!  └─ 6. Persist   <name>[_pageN].csv, never overwriting
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2csv::{convert_directory, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY when no key is set explicitly.
//!     let config = ExtractionConfig::default();
//!     let report = convert_directory("scans", None, &config).await?;
//!     eprintln!(
//!         "{} written, {} skipped, {} failed",
//!         report.processed, report.skipped, report.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2csv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Choosing a Model
//!
//! | Tier | Model | Best for |
//! |------|-------|----------|
//! | [`ModelTier::Fast`] | `gemini-1.5-flash` | Default; clean scans, large batches |
//! | [`ModelTier::Accurate`] | `gemini-1.5-pro` | Faded, skewed or handwritten tables |
//!
//! Any other model id can be set with [`ExtractionConfigBuilder::model`], and
//! any edgequake-llm provider with [`ExtractionConfigBuilder::provider_name`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchDriver, CancelFlag};
pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, ModelTier, NamingStrategy, PromptVersion, RetryPolicy,
};
pub use convert::{
    convert_directory, convert_directory_sync, convert_directory_with, convert_drive_folder,
    convert_drive_folder_with, convert_file, convert_sources,
};
pub use document::{MediaType, PageUnit, SourceDocument, SourceFile};
pub use error::{Pdf2CsvError, UnitError};
pub use output::{BatchReport, ExtractionResult, FileOutcome, OutputRecord, Stage, UnitOutcome, UnitStatus};
pub use pipeline::extract::ExtractionClient;
pub use pipeline::naming::{all_pages_exist, output_file_name, resolve_output_path, should_skip};
pub use pipeline::sanitize::{parse_metadata, sanitize, CollectionMetadata};
pub use pipeline::split::{PageSplitter, PdfiumSplitter};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use provider::{GeminiBackend, GenerateRequest, GenerateResponse, LlmProviderBackend, ModelBackend, ProviderError};
pub use storage::{DriveClient, DriveFile, DriveSink, LocalDirSink, OutputSink, StorageError};
