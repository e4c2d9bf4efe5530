//! Training-time feature transformation, replayed at serving time.
//!
//! A [`FeatureTransformer`] is an ordered list of [`TransformStep`]s with all
//! constants fixed at export time. Applying it is a pure function of the
//! input: no randomness, no fitted state beyond what the steps declare.
//!
//! # Steps
//!
//! - [`CategoricalMap`]: closed vocabulary to numeric code
//! - [`PolynomialExpansion`]: polynomial/interaction terms over named columns
//! - [`TransformStep::Drop`]: remove source columns after expansion
//!
//! # Example
//!
//! ```
//! use modelpack::transform::{CategoricalMap, FeatureTransformer, PolynomialParams, TransformStep};
//! use modelpack::value::{record, Value};
//!
//! let transformer = FeatureTransformer::new(vec![
//!     TransformStep::Polynomial(
//!         PolynomialParams::builder()
//!             .columns(vec!["a".into(), "b".into()])
//!             .build()
//!             .unwrap(),
//!     ),
//!     TransformStep::Drop { columns: vec!["a".into(), "b".into()] },
//! ])
//! .unwrap();
//!
//! let out = transformer
//!     .transform_record(&record([("a", Value::from(2.0)), ("b", Value::from(3.0))]))
//!     .unwrap();
//! assert_eq!(out.len(), 5); // poly_0 ..= poly_4
//! ```

mod categorical;
mod polynomial;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use categorical::CategoricalMap;
pub use polynomial::{PolynomialExpansion, PolynomialParams, PolynomialParamsBuilder};

use crate::error::ConfigError;
use crate::value::{Record, Value};

/// Errors raised while transforming a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// A configured source column is absent (or null).
    #[error("missing source column {column:?}")]
    MissingColumn { column: String },

    /// A categorical value outside the training vocabulary.
    #[error("value {value} of column {column:?} is not in the training vocabulary")]
    UnknownCategory { column: String, value: String },

    /// A numeric source column holds a non-numeric value.
    #[error("column {column:?} expects a number, got {value}")]
    NonNumeric { column: String, value: Value },

    /// Failure inside a batch, tagged with the row position.
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<TransformError>,
    },
}

impl TransformError {
    /// The underlying error, without the batch row wrapper.
    pub fn root(&self) -> &TransformError {
        match self {
            TransformError::Row { source, .. } => source.root(),
            other => other,
        }
    }
}

/// One transformation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    Categorical(CategoricalMap),
    Polynomial(PolynomialExpansion),
    /// Remove columns. Every listed column must be present.
    Drop { columns: Vec<String> },
}

impl TransformStep {
    pub fn apply(&self, record: &mut Record) -> Result<(), TransformError> {
        match self {
            TransformStep::Categorical(map) => map.apply(record),
            TransformStep::Polynomial(expansion) => expansion.apply(record),
            TransformStep::Drop { columns } => {
                if let Some(missing) = columns.iter().find(|c| !record.contains_key(*c)) {
                    return Err(TransformError::MissingColumn {
                        column: missing.clone(),
                    });
                }
                for c in columns {
                    record.remove(c);
                }
                Ok(())
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            TransformStep::Categorical(map) => map.validate(),
            // validated on construction
            TransformStep::Polynomial(_) => Ok(()),
            TransformStep::Drop { columns } if columns.is_empty() => {
                Err(ConfigError::EmptyColumns("drop"))
            }
            TransformStep::Drop { .. } => Ok(()),
        }
    }
}

/// Ordered, deterministic record transformation.
///
/// An empty transformer is the identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TransformStep>", into = "Vec<TransformStep>")]
pub struct FeatureTransformer {
    steps: Vec<TransformStep>,
}

impl FeatureTransformer {
    pub fn new(steps: Vec<TransformStep>) -> Result<Self, ConfigError> {
        for step in &steps {
            step.validate()?;
        }
        Ok(Self { steps })
    }

    /// The identity transformer.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Transform one record. The input is not modified.
    pub fn transform_record(&self, record: &Record) -> Result<Record, TransformError> {
        let mut out = record.clone();
        for step in &self.steps {
            step.apply(&mut out)?;
        }
        Ok(out)
    }

    /// Transform a batch, stopping at the first failing row.
    ///
    /// The error is wrapped in [`TransformError::Row`] with the row position.
    pub fn transform(&self, batch: &[Record]) -> Result<Vec<Record>, TransformError> {
        batch
            .iter()
            .enumerate()
            .map(|(row, record)| {
                self.transform_record(record)
                    .map_err(|e| TransformError::Row {
                        row,
                        source: Box::new(e),
                    })
            })
            .collect()
    }
}

impl TryFrom<Vec<TransformStep>> for FeatureTransformer {
    type Error = ConfigError;

    fn try_from(steps: Vec<TransformStep>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<FeatureTransformer> for Vec<TransformStep> {
    fn from(t: FeatureTransformer) -> Self {
        t.steps
    }
}

/// Read a numeric source column, treating null as absent.
pub(crate) fn numeric_input(record: &Record, column: &str) -> Result<f64, TransformError> {
    match record.get(column) {
        None | Some(Value::Null) => Err(TransformError::MissingColumn {
            column: column.to_string(),
        }),
        Some(v) => v.as_f64().ok_or_else(|| TransformError::NonNumeric {
            column: column.to_string(),
            value: v.clone(),
        }),
    }
}
