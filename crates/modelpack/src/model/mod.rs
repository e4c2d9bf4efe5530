//! Invocable models.
//!
//! A model artifact deserializes into a `Box<dyn InferenceModel>`. Concrete
//! formats:
//!
//! - [`LinearModel`]: standardized linear/logistic model
//! - [`Forest`]: ensemble of decision trees
//!
//! Both produce raw margins; the shared [`InferenceModel::predict`] turns
//! margins into a [`Prediction`] using the model's [`ModelMeta`].
//!
//! # Example
//!
//! ```
//! use modelpack::model::{InferenceModel, LinearModel, ModelMeta, Prediction};
//! use ndarray::array;
//!
//! // margin = 2*x0 - x1 + 0.5
//! let model = LinearModel::new(
//!     array![[2.0], [-1.0], [0.5]],
//!     ModelMeta::for_binary_classification(2),
//! )
//! .unwrap();
//!
//! let pred = model.predict(array![1.0, 0.0].view()).unwrap();
//! assert!(matches!(pred, Prediction::Class { class: 1, .. }));
//! ```

mod forest;
mod linear;
mod meta;
mod persist;
mod transform;

use std::fmt::Debug;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use forest::{Forest, ForestError, NodeId, Tree, TreeBuilder, TreeError};
pub use linear::{LinearModel, Standardizer};
pub use meta::{ModelMeta, TaskKind};
pub use persist::{
    decode_model, encode_model, DecodeError, ModelArtifact, ModelEncoding, MODEL_MAGIC,
};
pub use transform::OutputTransform;

/// Failure of a single model invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("model expects {expected} features, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("model produced a non-finite output at position {position}")]
    NonFinite { position: usize },

    #[error("model returned {got} margins, expected {expected}")]
    OutputArity { expected: usize, got: usize },
}

/// Raw output of a model for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prediction {
    /// Classifier output: the chosen class value and the transformed scores
    /// (one per output group).
    Class { class: i64, scores: Vec<f64> },
    /// Regressor output.
    Value { value: f64 },
}

impl Prediction {
    /// Class value, if this is a classifier output.
    pub fn class(&self) -> Option<i64> {
        match self {
            Prediction::Class { class, .. } => Some(*class),
            Prediction::Value { .. } => None,
        }
    }

    /// Transformed scores (probabilities for classifiers, the value for
    /// regressors).
    pub fn scores(&self) -> &[f64] {
        match self {
            Prediction::Class { scores, .. } => scores,
            Prediction::Value { value } => std::slice::from_ref(value),
        }
    }
}

/// A loaded, read-only model.
///
/// Implementors must be reentrant: `margins` is called concurrently from
/// the pipeline runner's worker threads.
pub trait InferenceModel: Send + Sync + Debug {
    /// Shared metadata.
    fn meta(&self) -> &ModelMeta;

    /// Raw margins for one feature row of length `meta().n_features`.
    ///
    /// Returns `meta().n_groups()` values.
    ///
    /// # Panics
    ///
    /// May panic on a row of the wrong length; [`predict`](Self::predict)
    /// checks the shape first.
    fn margins(&self, features: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Check shape, compute margins, transform them and decide.
    ///
    /// Binary classifiers pick class position 1 when the margin is positive.
    /// Multiclass classifiers pick the highest score, first on ties.
    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<Prediction, InferenceError> {
        let meta = self.meta();
        if features.len() != meta.n_features {
            return Err(InferenceError::ShapeMismatch {
                expected: meta.n_features,
                got: features.len(),
            });
        }

        let margins = self.margins(features);
        if margins.len() != meta.n_groups() {
            return Err(InferenceError::OutputArity {
                expected: meta.n_groups(),
                got: margins.len(),
            });
        }
        if let Some(position) = margins.iter().position(|m| m.is_nan()) {
            return Err(InferenceError::NonFinite { position });
        }

        let mut scores = margins.to_vec();
        meta.output_transform.transform_inplace(&mut scores);
        if let Some(position) = scores.iter().position(|s| !s.is_finite()) {
            return Err(InferenceError::NonFinite { position });
        }

        Ok(match meta.task {
            TaskKind::Regression => Prediction::Value { value: scores[0] },
            TaskKind::BinaryClassification => {
                let position = usize::from(margins[0] > 0.0);
                Prediction::Class {
                    class: meta.class_value(position),
                    scores,
                }
            }
            TaskKind::MulticlassClassification { .. } => {
                let position = transform::argmax(&scores);
                Prediction::Class {
                    class: meta.class_value(position),
                    scores,
                }
            }
        })
    }
}
