//! Classification quality of a scored batch.
//!
//! Compares predicted labels against expected labels and reports accuracy
//! plus support-weighted precision, recall and F1. A record that failed to
//! score has no predicted label: it counts as a miss for its true class and
//! as a false positive for none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("{predicted} predictions for {expected} expected labels")]
    LengthMismatch { predicted: usize, expected: usize },
}

// =============================================================================
// Per-class metrics
// =============================================================================

/// Metrics for one class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    /// Number of records whose true label is this class.
    pub support: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

/// `num / den`, 0 when the denominator is 0.
#[inline]
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

impl Counts {
    fn metrics(self, label: &str) -> ClassMetrics {
        let precision = ratio(self.tp as f64, (self.tp + self.fp) as f64);
        let recall = ratio(self.tp as f64, (self.tp + self.fn_) as f64);
        let f1 = ratio(2.0 * precision * recall, precision + recall);
        ClassMetrics {
            label: label.to_string(),
            support: self.tp + self.fn_,
            precision,
            recall,
            f1,
        }
    }
}

// =============================================================================
// ClassificationReport
// =============================================================================

/// Aggregate classification quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub n_samples: usize,
    /// Records that produced no label.
    pub n_unscored: usize,
    pub accuracy: f64,
    /// Support-weighted mean of per-class precision.
    pub precision: f64,
    /// Support-weighted mean of per-class recall.
    pub recall: f64,
    /// Support-weighted mean of per-class F1.
    pub f1: f64,
    /// Per-class breakdown, sorted by label.
    pub per_class: Vec<ClassMetrics>,
}

impl ClassificationReport {
    /// Build a report from predicted and expected labels.
    ///
    /// `None` in `predicted` marks a record that could not be scored.
    pub fn compute<E, P>(expected: &[E], predicted: &[Option<P>]) -> Result<Self, EvalError>
    where
        E: AsRef<str>,
        P: AsRef<str>,
    {
        if expected.len() != predicted.len() {
            return Err(EvalError::LengthMismatch {
                predicted: predicted.len(),
                expected: expected.len(),
            });
        }

        let mut counts: BTreeMap<&str, Counts> = BTreeMap::new();
        let mut correct = 0usize;
        let mut unscored = 0usize;

        for (truth, pred) in expected.iter().zip(predicted) {
            let truth: &str = truth.as_ref();
            let pred: Option<&str> = pred.as_ref().map(|p| p.as_ref());
            match pred {
                Some(p) if p == truth => {
                    correct += 1;
                    counts.entry(truth).or_default().tp += 1;
                }
                Some(p) => {
                    counts.entry(truth).or_default().fn_ += 1;
                    counts.entry(p).or_default().fp += 1;
                }
                None => {
                    unscored += 1;
                    counts.entry(truth).or_default().fn_ += 1;
                }
            }
        }

        let n = expected.len();
        let per_class: Vec<ClassMetrics> = counts
            .iter()
            .map(|(label, c)| c.metrics(label))
            .collect();

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            ratio(
                per_class.iter().map(|m| m.support as f64 * f(m)).sum(),
                n as f64,
            )
        };

        Ok(Self {
            n_samples: n,
            n_unscored: unscored,
            accuracy: ratio(correct as f64, n as f64),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            per_class,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16} {:>9} {:>9} {:>9} {:>8}", "", "precision", "recall", "f1", "support")?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:<16} {:>9.4} {:>9.4} {:>9.4} {:>8}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(
            f,
            "{:<16} {:>9.4} {:>9.4} {:>9.4} {:>8}",
            "weighted avg", self.precision, self.recall, self.f1, self.n_samples
        )?;
        write!(f, "accuracy {:.4} ({} unscored)", self.accuracy, self.n_unscored)
    }
}
