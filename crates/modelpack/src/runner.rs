//! Batch scoring.
//!
//! [`PipelineRunner`] applies a [`Predictor`] to every record of a batch.
//! Results are positionally aligned with the input: result `i` is either the
//! output record for input `i` or a [`RecordFailure`] tagged with `i`. One
//! failing record never aborts or reorders the rest.
//!
//! Records are scored on a rayon pool bounded by [`RunnerConfig::n_threads`];
//! indexed collection keeps input order whatever the completion order.
//!
//! # Example
//!
//! ```
//! use modelpack::runner::{PipelineRunner, RunnerConfig};
//! use modelpack::testing::{tumour_batch, tumour_predictor};
//!
//! let predictor = tumour_predictor();
//! let records = tumour_batch(100);
//!
//! let runner = PipelineRunner::new(RunnerConfig::builder().chunk_size(64).build().unwrap());
//! let report = runner.run(&predictor, &records);
//! assert_eq!(report.len(), records.len());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::eval::{ClassificationReport, EvalError};
use crate::predictor::{PredictError, Predictor};
use crate::utils::run_with_threads;
use crate::value::{Record, Value};

// =============================================================================
// Configuration
// =============================================================================

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct RunnerConfig {
    /// Worker threads. `None` uses every core; 1 runs sequentially on the
    /// calling thread.
    pub n_threads: Option<NonZeroUsize>,

    /// Minimum number of records per parallel task. Default: 1.
    #[builder(default = 1)]
    pub chunk_size: usize,
}

impl<S: runner_config_builder::IsComplete> RunnerConfigBuilder<S> {
    /// Validate and build.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidChunkSize`] when `chunk_size` is 0.
    pub fn build(self) -> Result<RunnerConfig, ConfigError> {
        let config = self.__build_internal();
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        Ok(config)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            n_threads: None,
            chunk_size: 1,
        }
    }
}

impl RunnerConfig {
    /// Single-threaded configuration.
    pub fn sequential() -> Self {
        Self {
            n_threads: Some(NonZeroUsize::MIN),
            chunk_size: 1,
        }
    }

    /// Thread count in [`run_with_threads`] terms (0 = auto).
    fn thread_count(&self) -> usize {
        self.n_threads.map_or(0, NonZeroUsize::get)
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Shared flag that stops dispatch of further records.
///
/// Records already being scored complete normally; records not yet started
/// are reported as [`FailureKind::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Why a record produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transform,
    SchemaViolation,
    Inference,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Transform => "transform",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::Inference => "inference",
            FailureKind::Cancelled => "cancelled",
        })
    }
}

impl From<&PredictError> for FailureKind {
    fn from(err: &PredictError) -> Self {
        match err {
            PredictError::Transform(_) => FailureKind::Transform,
            PredictError::SchemaViolation { .. } => FailureKind::SchemaViolation,
            PredictError::Inference(_) => FailureKind::Inference,
        }
    }
}

/// A record that produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Position in the input batch.
    pub index: usize,
    pub kind: FailureKind,
    pub message: String,
}

impl RecordFailure {
    fn from_error(index: usize, err: &PredictError) -> Self {
        Self {
            index,
            kind: err.into(),
            message: err.to_string(),
        }
    }

    fn cancelled(index: usize) -> Self {
        Self {
            index,
            kind: FailureKind::Cancelled,
            message: "batch cancelled before this record was dispatched".into(),
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} ({}): {}", self.index, self.kind, self.message)
    }
}

/// Outcome of scoring one record.
pub type RecordResult = Result<Record, RecordFailure>;

/// Aligned results of a batch plus aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    results: Vec<RecordResult>,
    failures_by_kind: BTreeMap<FailureKind, usize>,
    elapsed: Duration,
}

impl RunReport {
    fn new(results: Vec<RecordResult>, elapsed: Duration) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            *failures_by_kind.entry(failure.kind).or_insert(0) += 1;
        }
        Self {
            results,
            failures_by_kind,
            elapsed,
        }
    }

    /// Results in input order.
    pub fn results(&self) -> &[RecordResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RecordResult> {
        self.results
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn n_succeeded(&self) -> usize {
        self.results.len() - self.n_failed()
    }

    pub fn n_failed(&self) -> usize {
        self.failures_by_kind.values().sum()
    }

    /// Failure counts per kind; kinds that never occurred are absent.
    pub fn failures_by_kind(&self) -> &BTreeMap<FailureKind, usize> {
        &self.failures_by_kind
    }

    /// Number of failures of one kind.
    pub fn n_failures(&self, kind: FailureKind) -> usize {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Successful outputs with their input positions.
    pub fn outputs(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|rec| (i, rec)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }

    /// Wall-clock time of the batch.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Scored batch plus quality metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub run: RunReport,
    pub metrics: ClassificationReport,
}

// =============================================================================
// PipelineRunner
// =============================================================================

/// Applies a predictor over batches.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    config: RunnerConfig,
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Score every record.
    pub fn run(&self, predictor: &Predictor, records: &[Record]) -> RunReport {
        self.run_cancellable(predictor, records, &CancellationToken::new())
    }

    /// Score every record until `token` is cancelled.
    ///
    /// The report always has one result per input record.
    pub fn run_cancellable(
        &self,
        predictor: &Predictor,
        records: &[Record],
        token: &CancellationToken,
    ) -> RunReport {
        let start = Instant::now();
        let chunk_size = self.config.chunk_size;

        let results = run_with_threads(self.config.thread_count(), |parallelism| {
            parallelism.maybe_par_map_indexed(records, chunk_size, |index, record| {
                if token.is_cancelled() {
                    return Err(RecordFailure::cancelled(index));
                }
                predictor.predict(record).map_err(|err| {
                    tracing::debug!(index, error = %err, "record failed");
                    RecordFailure::from_error(index, &err)
                })
            })
        });

        let report = RunReport::new(results, start.elapsed());
        tracing::info!(
            n_records = report.len(),
            n_succeeded = report.n_succeeded(),
            n_failed = report.n_failed(),
            n_cancelled = report.n_failures(FailureKind::Cancelled),
            elapsed_ms = report.elapsed().as_millis() as u64,
            "batch scored"
        );
        report
    }

    /// Score a batch and compare the output labels with `labels`.
    ///
    /// Failed records, and outputs whose field is not a label, count as
    /// incorrect.
    pub fn evaluate<L: AsRef<str>>(
        &self,
        predictor: &Predictor,
        records: &[Record],
        labels: &[L],
    ) -> Result<Evaluation, EvalError> {
        if records.len() != labels.len() {
            return Err(EvalError::LengthMismatch {
                predicted: records.len(),
                expected: labels.len(),
            });
        }
        let run = self.run(predictor, records);
        let metrics = {
            let field = &predictor.output().field;
            let predicted: Vec<Option<&str>> = run
                .results()
                .iter()
                .map(|r| {
                    r.as_ref()
                        .ok()
                        .and_then(|out| out.get(field))
                        .and_then(Value::as_str)
                })
                .collect();
            ClassificationReport::compute(labels, predicted.as_slice())?
        };
        tracing::info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            n_samples = metrics.n_samples,
            "batch evaluated"
        );
        Ok(Evaluation { run, metrics })
    }
}
