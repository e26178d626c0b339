//! Batch driver: walks the worklist and moves every unit through the
//! pipeline, one unit at a time.
//!
//! ```text
//! Pending ─▶ Splitting ─▶ Extracting ─▶ Sanitizing ─▶ Persisting ─▶ Done
//!    │           │             │              │             │
//!    └─ skipped  └─ failed     └─ failed      └─ failed     └─ failed
//!       (all outputs exist)       (per unit)     (empty)       (write)
//! ```
//!
//! Nothing that happens to one unit stops the batch. Failures are recorded
//! in the [`BatchReport`], which is returned even when every unit failed.
//!
//! Units whose output already exists are skipped without a model call, so
//! re-running a batch only pays for what is still missing. A source whose
//! outputs all exist is not even split.

use crate::config::{ExtractionConfig, NamingStrategy};
use crate::document::{MediaType, PageUnit, SourceFile};
use crate::error::UnitError;
use crate::output::{BatchReport, FileOutcome, OutputRecord, Stage, UnitOutcome, UnitStatus};
use crate::pipeline::extract::ExtractionClient;
use crate::pipeline::naming::{all_units_exist, output_file_name, output_file_name_with};
use crate::pipeline::sanitize::{parse_metadata, sanitize};
use crate::pipeline::split::{count_pages, split_document, PageSplitter};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::storage::{OutputSink, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation, checked once per unit.
///
/// Clones share the flag: hand one to a signal handler and one to the driver.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Work planned for one source before processing starts.
struct Plan {
    /// Units this source contributes to the progress total.
    units: usize,
    /// Known page indices, when the source could be read and counted.
    indices: Option<Vec<Option<usize>>>,
}

/// Sequential driver over a list of sources.
pub struct BatchDriver {
    client: ExtractionClient,
    splitter: Arc<dyn PageSplitter>,
    sink: Arc<dyn OutputSink>,
    naming: NamingStrategy,
    item_delay: Duration,
    progress: ProgressCallback,
    cancel: CancelFlag,
}

/// Mutable state threaded through one run.
struct RunState {
    report: BatchReport,
    done: usize,
    total: usize,
    called_model: bool,
}

impl BatchDriver {
    pub fn new(
        client: ExtractionClient,
        splitter: Arc<dyn PageSplitter>,
        sink: Arc<dyn OutputSink>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            client,
            splitter,
            sink,
            naming: config.naming,
            item_delay: config.item_delay,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            cancel: CancelFlag::new(),
        }
    }

    /// Use `flag` to stop the batch early.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Process `sources` in order and return the report.
    pub async fn run(&self, sources: &[SourceFile]) -> BatchReport {
        let start = Instant::now();
        let plans = self.plan(sources).await;
        let total = plans.iter().map(|p| p.units).sum();

        info!(
            "Batch: {} files, {} units, model {} via {}",
            sources.len(),
            total,
            self.client.model(),
            self.client.backend_name()
        );
        self.progress.on_batch_start(sources.len(), total);

        let mut state = RunState {
            report: BatchReport::default(),
            done: 0,
            total,
            called_model: false,
        };

        for (i, (source, plan)) in sources.iter().zip(plans).enumerate() {
            if self.cancel.is_cancelled() {
                state.report.cancelled = true;
                break;
            }
            self.progress.on_file_start(i, sources.len(), &source.name);
            let mut file = FileOutcome {
                source_name: source.name.clone(),
                units: Vec::new(),
            };
            self.process_source(source, plan, &mut file, &mut state).await;
            info!(
                "{}: {} written, {} skipped, {} failed",
                source.name,
                file.written(),
                file.skipped(),
                file.failed()
            );
            state.report.files.push(file);
        }

        let mut report = state.report;
        report.total_duration_ms = start.elapsed().as_millis() as u64;
        if report.cancelled {
            warn!("Batch cancelled after {} of {} units", state.done, total);
        }
        self.progress
            .on_batch_complete(report.processed, report.skipped, report.failed);
        report
    }

    /// Count units up front so progress has a stable total.
    ///
    /// A source that cannot be read or counted contributes one unit; it will
    /// fail again, and be recorded, when it is processed.
    async fn plan(&self, sources: &[SourceFile]) -> Vec<Plan> {
        let mut plans = Vec::with_capacity(sources.len());
        for source in sources {
            let indices = match source.media_type {
                MediaType::Jpeg => Some(vec![None]),
                MediaType::Pdf => match source.read().await {
                    Ok(doc) => match count_pages(Arc::clone(&self.splitter), doc).await {
                        Ok(n) if n > 0 => Some((0..n).map(Some).collect()),
                        Ok(_) => None,
                        Err(e) => {
                            debug!("{}: page count failed: {}", source.name, e);
                            None
                        }
                    },
                    Err(_) => None,
                },
            };
            let units = indices.as_ref().map_or(1, Vec::len);
            plans.push(Plan { units, indices });
        }
        plans
    }

    async fn process_source(
        &self,
        source: &SourceFile,
        plan: Plan,
        file: &mut FileOutcome,
        state: &mut RunState,
    ) {
        // Pending: whole-source skip.
        if self.naming == NamingStrategy::SourceName {
            if let Some(indices) = &plan.indices {
                match all_units_exist(self.sink.as_ref(), &source.name, indices).await {
                    Ok(true) => {
                        info!("{}: all outputs exist, skipping", source.name);
                        for idx in indices {
                            let name = output_file_name(&source.name, *idx);
                            self.record_skip(source, *idx, &name, 0, file, state);
                        }
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => debug!("{}: existence check failed: {}", source.name, e),
                }
            }
        }

        let doc = match source.read().await {
            Ok(doc) => doc,
            Err(e) => {
                self.record_source_failure(source, Stage::Pending, e, plan.units, file, state);
                return;
            }
        };

        // Splitting.
        let units = match split_document(Arc::clone(&self.splitter), doc).await {
            Ok(units) if units.is_empty() => {
                let err = UnitError::SplitFailed {
                    source_name: source.name.clone(),
                    detail: "document has no pages".into(),
                };
                self.record_source_failure(source, Stage::Splitting, err, plan.units, file, state);
                return;
            }
            Ok(units) => units,
            Err(e) => {
                self.record_source_failure(source, Stage::Splitting, e, plan.units, file, state);
                return;
            }
        };

        for unit in units {
            if self.cancel.is_cancelled() {
                state.report.cancelled = true;
                return;
            }
            self.process_unit(source, unit, file, state).await;
        }
    }

    async fn process_unit(
        &self,
        source: &SourceFile,
        unit: PageUnit,
        file: &mut FileOutcome,
        state: &mut RunState,
    ) {
        let label = unit.label();
        let idx = unit.page_index;

        // Per-unit skip; the name is only known up front for source naming.
        if self.naming == NamingStrategy::SourceName {
            let name = output_file_name(&source.name, idx);
            match self.sink.exists(&name).await {
                Ok(true) => {
                    debug!("{}: output exists, skipping", label);
                    self.record_skip(source, idx, &name, 0, file, state);
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    let err = UnitError::from_storage(&self.sink.location(&name), e);
                    self.record_failure(source, idx, Stage::Pending, err, 0, file, state);
                    return;
                }
            }
        }

        // Keep at least `item_delay` between consecutive model calls.
        if state.called_model && !self.item_delay.is_zero() {
            tokio::time::sleep(self.item_delay).await;
        }
        state.called_model = true;

        // Extracting.
        self.progress.on_unit_start(state.done, state.total, &label);
        let result = self.client.extract(&unit).await;
        state.report.model_calls += result.attempts as usize;
        let attempts = result.attempts;
        let raw = match result.outcome {
            Ok(raw) => raw,
            Err(e) => {
                self.record_failure(source, idx, Stage::Extracting, e, attempts, file, state);
                return;
            }
        };

        // Sanitizing.
        let csv = sanitize(&raw);
        if csv.is_empty() {
            self.record_failure(
                source,
                idx,
                Stage::Sanitizing,
                UnitError::EmptyResult,
                attempts,
                file,
                state,
            );
            return;
        }
        let metadata = parse_metadata(&csv);

        // Persisting.
        let name = output_file_name_with(self.naming, &source.name, idx, metadata.as_ref());
        let location = self.sink.location(&name);
        match self.sink.write(&name, &csv).await {
            Ok(location) => {
                state.done += 1;
                self.progress
                    .on_unit_complete(state.done.min(state.total), state.total, &label, &location);
                let outcome = UnitOutcome {
                    source_name: source.name.clone(),
                    page_index: idx,
                    attempts,
                    status: UnitStatus::Written(OutputRecord {
                        location,
                        csv,
                        metadata,
                        newly_written: true,
                    }),
                };
                state.report.record(file, outcome);
            }
            Err(StorageError::AlreadyExists(_)) => {
                // Only reachable with metadata naming.
                debug!("{}: {} already exists, not overwriting", label, location);
                self.record_skip(source, idx, &name, attempts, file, state);
            }
            Err(e) => {
                let err = UnitError::from_storage(&location, e);
                self.record_failure(source, idx, Stage::Persisting, err, attempts, file, state);
            }
        }
    }

    fn record_skip(
        &self,
        source: &SourceFile,
        page_index: Option<usize>,
        name: &str,
        attempts: u32,
        file: &mut FileOutcome,
        state: &mut RunState,
    ) {
        let label = unit_label(&source.name, page_index);
        state.done += 1;
        self.progress
            .on_unit_skipped(state.done.min(state.total), state.total, &label);
        let outcome = UnitOutcome {
            source_name: source.name.clone(),
            page_index,
            attempts,
            status: UnitStatus::Skipped {
                location: self.sink.location(name),
            },
        };
        state.report.record(file, outcome);
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        source: &SourceFile,
        page_index: Option<usize>,
        stage: Stage,
        error: UnitError,
        attempts: u32,
        file: &mut FileOutcome,
        state: &mut RunState,
    ) {
        let label = unit_label(&source.name, page_index);
        warn!("{}: failed while {:?}: {}", label, stage, error);
        state.done += 1;
        self.progress.on_unit_error(
            state.done.min(state.total),
            state.total,
            &label,
            &error.to_string(),
        );
        let outcome = UnitOutcome {
            source_name: source.name.clone(),
            page_index,
            attempts,
            status: UnitStatus::Failed { stage, error },
        };
        state.report.record(file, outcome);
    }

    /// A source that failed before producing units counts as one failure but
    /// advances progress by every unit it was planned to contribute.
    fn record_source_failure(
        &self,
        source: &SourceFile,
        stage: Stage,
        error: UnitError,
        planned_units: usize,
        file: &mut FileOutcome,
        state: &mut RunState,
    ) {
        state.done += planned_units.saturating_sub(1);
        self.record_failure(source, None, stage, error, 0, file, state);
    }
}

fn unit_label(source_name: &str, page_index: Option<usize>) -> String {
    match page_index {
        Some(idx) => format!("{} p{}", source_name, idx + 1),
        None => source_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn labels() {
        assert_eq!(unit_label("a.pdf", Some(0)), "a.pdf p1");
        assert_eq!(unit_label("b.jpg", None), "b.jpg");
    }
}
