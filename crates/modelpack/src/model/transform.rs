//! Output transformation for inference.
//!
//! The [`OutputTransform`] enum defines how raw model outputs (margins)
//! become scores: identity for regressors, sigmoid for binary classifiers,
//! softmax for multiclass classifiers. It is persisted with the model so
//! inference never needs the training objective.

use serde::{Deserialize, Serialize};

/// Inference-time output transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputTransform {
    /// No transformation; output = margin.
    #[default]
    Identity,

    /// Logistic sigmoid: output = 1 / (1 + exp(-margin)).
    Sigmoid,

    /// Softmax: output_i = exp(margin_i) / sum(exp(margin_j)).
    Softmax,
}

impl OutputTransform {
    /// Apply the transformation in-place to one row of margins.
    ///
    /// Sigmoid clamps its input to [-500, 500]; softmax subtracts the row
    /// max before exponentiating. NaN propagates (garbage in, garbage out);
    /// callers check finiteness afterwards.
    #[inline]
    pub fn transform_inplace(&self, row: &mut [f64]) {
        match self {
            OutputTransform::Identity => {}
            OutputTransform::Sigmoid => {
                for x in row.iter_mut() {
                    *x = sigmoid(*x);
                }
            }
            OutputTransform::Softmax => softmax_inplace(row),
        }
    }
}

/// Numerically stable sigmoid.
#[inline]
fn sigmoid(x: f64) -> f64 {
    let clamped = x.clamp(-500.0, 500.0);
    if clamped >= 0.0 {
        1.0 / (1.0 + (-clamped).exp())
    } else {
        let e = clamped.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable softmax in-place.
#[inline]
fn softmax_inplace(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0f64;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}

/// Position of the largest score; the first one wins ties.
#[inline]
pub(crate) fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}
