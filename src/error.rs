//! Error types for the edgequake-pdf2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2CsvError`]: **Fatal**: the batch cannot start at all (missing API
//!   key, input directory not found, Drive session expired while listing).
//!   Returned as `Err(Pdf2CsvError)` from the top-level `convert*` functions.
//!
//! * [`UnitError`]: **Non-fatal**: a single source file or page failed
//!   (corrupt PDF, rate limit exhausted, empty model answer, write error) but
//!   the batch keeps going. Stored inside [`crate::output::UnitOutcome`] so
//!   callers get a complete report even when every item fails.
//!
//! Backend and storage collaborators have their own narrow error types
//! ([`crate::provider::ProviderError`], [`crate::storage::StorageError`]) which
//! the pipeline converts into [`UnitError`] at the stage where they occur.

use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2csv library.
///
/// Per-file and per-page failures use [`UnitError`] and are recorded in the
/// [`crate::output::BatchReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2CsvError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key was configured for the built-in Gemini backend.
    #[error("Gemini API key is not configured.\n{hint}")]
    MissingApiKey { hint: String },

    /// A named edgequake-llm provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input directory or file was not found.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// A directory was expected but the path points elsewhere.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The cloud-storage access token is expired or revoked.
    ///
    /// Kept apart from [`Pdf2CsvError::Storage`] so interactive callers can
    /// prompt for re-authentication instead of reporting a generic failure.
    #[error("Google Drive session has expired: {detail}\nReconnect and retry.")]
    SessionExpired { detail: String },

    /// Any other cloud-storage failure while preparing the batch.
    #[error("Storage error: {0}")]
    Storage(StorageError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for Pdf2CsvError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SessionExpired(detail) => Pdf2CsvError::SessionExpired { detail },
            other => Pdf2CsvError::Storage(other),
        }
    }
}

/// A non-fatal error for a single source file or page unit.
///
/// The batch continues after any of these; they end up in the report.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The source file could not be read from disk.
    #[error("{source_name}: read failed: {detail}")]
    ReadFailed { source_name: String, detail: String },

    /// The source could not be parsed as its declared media type.
    #[error("{source_name}: split failed: {detail}")]
    SplitFailed { source_name: String, detail: String },

    /// The provider kept signalling rate limits until attempts ran out.
    #[error("rate limited after {attempts} attempts: {detail}")]
    RateLimited { attempts: u32, detail: String },

    /// The provider returned a non-retryable error.
    #[error("provider error: {detail}")]
    ProviderFailed { detail: String },

    /// The call succeeded but produced no usable text.
    #[error("no data extracted")]
    EmptyResult,

    /// The CSV could not be persisted.
    #[error("write to '{location}' failed: {detail}")]
    WriteFailed { location: String, detail: String },

    /// The cloud-storage session expired mid-batch.
    #[error("storage session expired: {detail}")]
    SessionExpired { detail: String },
}

impl UnitError {
    /// True when the failure needs the user to re-authenticate.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, UnitError::SessionExpired { .. })
    }

    /// Map a storage failure observed while persisting `location`.
    pub fn from_storage(location: &str, e: StorageError) -> Self {
        match e {
            StorageError::SessionExpired(detail) => UnitError::SessionExpired { detail },
            other => UnitError::WriteFailed {
                location: location.to_string(),
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_display() {
        let e = Pdf2CsvError::MissingApiKey {
            hint: "Set GEMINI_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("API key"), "got: {msg}");
        assert!(msg.contains("GEMINI_API_KEY"), "got: {msg}");
    }

    #[test]
    fn rate_limited_display() {
        let e = UnitError::RateLimited {
            attempts: 3,
            detail: "Rate limit exceeded".into(),
        };
        assert!(e.to_string().contains("3 attempts"));
    }

    #[test]
    fn split_failed_names_source() {
        let e = UnitError::SplitFailed {
            source_name: "broken.pdf".into(),
            detail: "bad xref".into(),
        };
        assert!(e.to_string().starts_with("broken.pdf"));
    }

    #[test]
    fn storage_session_expiry_maps_to_fatal_variant() {
        let e: Pdf2CsvError = StorageError::SessionExpired("invalid_grant".into()).into();
        assert!(matches!(e, Pdf2CsvError::SessionExpired { .. }));
    }

    #[test]
    fn storage_session_expiry_maps_to_unit_variant() {
        let e = UnitError::from_storage("a.csv", StorageError::SessionExpired("401".into()));
        assert!(e.is_session_expired());

        let e = UnitError::from_storage(
            "a.csv",
            StorageError::Http {
                status: 500,
                body: "boom".into(),
            },
        );
        assert!(matches!(e, UnitError::WriteFailed { ref location, .. } if location == "a.csv"));
    }
}
