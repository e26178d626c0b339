//! Result types produced by the extraction pipeline.
//!
//! Everything here is plain data and `Serialize`, so the CLI can dump a
//! [`BatchReport`] as JSON for scripting.

use crate::error::UnitError;
use crate::pipeline::sanitize::CollectionMetadata;
use serde::{Deserialize, Serialize};

/// Outcome of one extraction call sequence for a page unit.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub page_index: Option<usize>,
    /// Calls made to the provider, including the successful one.
    pub attempts: u32,
    /// Raw model text on success.
    pub outcome: Result<String, UnitError>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A persisted (or already present) CSV output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Path or remote location of the CSV.
    pub location: String,
    /// Sanitized CSV text. Not serialised: reports carry locations only.
    #[serde(skip)]
    pub csv: String,
    pub metadata: Option<CollectionMetadata>,
    /// `true` if written by this run, `false` if it already existed.
    pub newly_written: bool,
}

/// Pipeline stage a unit had reached when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Pending,
    Splitting,
    Extracting,
    Sanitizing,
    Persisting,
}

/// Terminal state of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitStatus {
    /// A new CSV was written.
    Written(OutputRecord),
    /// Output already existed; no model call was made.
    Skipped { location: String },
    /// The unit failed at `stage`.
    Failed { stage: Stage, error: UnitError },
}

/// Per-unit entry of the batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub source_name: String,
    /// 0-based page index; `None` for images and whole-source failures.
    pub page_index: Option<usize>,
    pub attempts: u32,
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self.status, UnitStatus::Written(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, UnitStatus::Skipped { .. })
    }

    pub fn error(&self) -> Option<&UnitError> {
        match &self.status {
            UnitStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// All units of one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source_name: String,
    pub units: Vec<UnitOutcome>,
}

impl FileOutcome {
    pub fn written(&self) -> usize {
        self.units.iter().filter(|u| u.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.units.iter().filter(|u| u.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.units.iter().filter(|u| u.error().is_some()).count()
    }

    /// True if at least one unit produced or already had an output.
    pub fn has_output(&self) -> bool {
        self.units.iter().any(|u| u.is_written() || u.is_skipped())
    }
}

/// Running counters plus per-file outcomes for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Units whose CSV was written by this run.
    pub processed: usize,
    /// Units skipped because their output already existed.
    pub skipped: usize,
    /// Units (or whole sources, for read/split failures) that failed.
    pub failed: usize,
    /// Total provider calls, retries included.
    pub model_calls: usize,
    pub files: Vec<FileOutcome>,
    /// The batch was stopped before visiting every unit.
    pub cancelled: bool,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub(crate) fn record(&mut self, file: &mut FileOutcome, outcome: UnitOutcome) {
        match outcome.status {
            UnitStatus::Written(_) => self.processed += 1,
            UnitStatus::Skipped { .. } => self.skipped += 1,
            UnitStatus::Failed { .. } => self.failed += 1,
        }
        file.units.push(outcome);
    }

    /// True if any unit failed because the storage session expired.
    pub fn session_expired(&self) -> bool {
        self.files
            .iter()
            .flat_map(|f| f.units.iter())
            .any(|u| u.error().is_some_and(UnitError::is_session_expired))
    }

    /// Every written or skipped output location, in batch order.
    pub fn output_locations(&self) -> Vec<&str> {
        self.files
            .iter()
            .flat_map(|f| f.units.iter())
            .filter_map(|u| match &u.status {
                UnitStatus::Written(r) => Some(r.location.as_str()),
                UnitStatus::Skipped { location } => Some(location.as_str()),
                UnitStatus::Failed { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: UnitStatus) -> UnitOutcome {
        UnitOutcome {
            source_name: "a.pdf".into(),
            page_index: Some(0),
            attempts: 1,
            status,
        }
    }

    #[test]
    fn record_updates_counters() {
        let mut report = BatchReport::default();
        let mut file = FileOutcome {
            source_name: "a.pdf".into(),
            units: vec![],
        };
        report.record(
            &mut file,
            outcome(UnitStatus::Skipped {
                location: "a_page1.csv".into(),
            }),
        );
        report.record(
            &mut file,
            outcome(UnitStatus::Failed {
                stage: Stage::Extracting,
                error: UnitError::EmptyResult,
            }),
        );
        assert_eq!((report.processed, report.skipped, report.failed), (0, 1, 1));
        assert_eq!(file.skipped(), 1);
        assert_eq!(file.failed(), 1);
        assert!(file.has_output());
    }

    #[test]
    fn session_expiry_is_detected() {
        let mut report = BatchReport::default();
        let mut file = FileOutcome::default();
        report.record(
            &mut file,
            outcome(UnitStatus::Failed {
                stage: Stage::Persisting,
                error: UnitError::SessionExpired {
                    detail: "invalid_grant".into(),
                },
            }),
        );
        report.files.push(file);
        assert!(report.session_expired());
    }

    #[test]
    fn report_serialises_to_json() {
        let report = BatchReport::default();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"processed\":0"));
    }
}
