//! Schema-enforced prediction.
//!
//! A [`Predictor`] owns one loaded model together with the contract it was
//! trained under. [`Predictor::predict`] runs, for one raw record:
//!
//! 0. the declared [`FeatureTransformer`] (identity when none is declared);
//! 1. schema enforcement: every schema column in schema order, the declared
//!    default for absent or null columns, extra fields dropped;
//! 2. model invocation;
//! 3. mapping the class through the output vocabulary.
//!
//! Construction failures ([`LoadError`]) are terminal. Per-record failures
//! ([`PredictError`]) are returned and never panic.

use std::path::Path;

use bon::Builder;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{resolve, Artifact, ArtifactError};
use crate::model::{decode_model, DecodeError, InferenceError, InferenceModel, Prediction};
use crate::package::ModelPackage;
use crate::schema::{FeatureSchema, OutputSpec};
use crate::transform::{FeatureTransformer, TransformError};
use crate::value::{Record, Value};

// =============================================================================
// Errors
// =============================================================================

/// Failure to build a predictor.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("cannot deserialize model artifact {artifact:?}: {source}")]
    Deserialization {
        artifact: String,
        #[source]
        source: DecodeError,
    },

    #[error("model expects {model} features, schema declares {schema}")]
    FeatureMismatch { model: usize, schema: usize },

    #[error("invalid package: {0}")]
    InvalidPackage(String),
}

/// Failure to score one record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("column {column:?} holds {value}, expected a number")]
    SchemaViolation { column: String, value: Value },

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

// =============================================================================
// PredictorSpec
// =============================================================================

/// Everything a predictor needs besides the artifact bytes.
///
/// # Example
///
/// ```
/// use modelpack::predictor::PredictorSpec;
/// use modelpack::schema::{FeatureSchema, OutputSpec};
///
/// let spec = PredictorSpec::builder()
///     .model_artifact("model.bin")
///     .schema(FeatureSchema::zeros(["a", "b", "c"]).unwrap())
///     .output(OutputSpec::labels("diagnosis", [(0, "Benign"), (1, "Malignant")]))
///     .build();
/// assert!(spec.transformer.is_identity());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(derive(Clone, Debug))]
pub struct PredictorSpec {
    /// Name of the artifact holding the serialized model.
    #[builder(into)]
    pub model_artifact: String,

    /// Model input columns, in training order, with defaults.
    pub schema: FeatureSchema,

    /// Output field and class vocabulary.
    pub output: OutputSpec,

    /// Record transformation replayed before schema enforcement.
    #[builder(default)]
    #[serde(default)]
    pub transformer: FeatureTransformer,
}

// =============================================================================
// TransformedRecord
// =============================================================================

/// A record conformed to the feature schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord<'a> {
    schema: &'a FeatureSchema,
    values: Array1<f64>,
    defaulted: Vec<usize>,
}

impl<'a> TransformedRecord<'a> {
    /// Feature vector in schema order.
    #[inline]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Value of a schema column by name.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.schema.index_of(column).map(|i| self.values[i])
    }

    /// Number of columns filled with their default.
    #[inline]
    pub fn n_defaulted(&self) -> usize {
        self.defaulted.len()
    }

    /// Names of the columns filled with their default, in schema order.
    pub fn defaulted_columns(&self) -> impl Iterator<Item = &'a str> + '_ {
        let schema = self.schema;
        self.defaulted
            .iter()
            .filter_map(move |&i| schema.column(i).map(|c| c.name.as_str()))
    }

    /// `(column, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, f64)> + '_ {
        let schema = self.schema;
        schema.names().zip(self.values.iter().copied())
    }

    /// Back to an open record, every value a float.
    pub fn to_record(&self) -> Record {
        self.iter()
            .map(|(name, v)| (name.to_string(), Value::Float(v)))
            .collect()
    }
}

// =============================================================================
// Predictor
// =============================================================================

/// One loaded model behind a stable input/output contract.
///
/// Read-only after construction: `predict` takes `&self` and the predictor
/// is `Send + Sync`, so one instance serves any number of threads.
#[derive(Debug)]
pub struct Predictor {
    spec: PredictorSpec,
    model: Box<dyn InferenceModel>,
}

impl Predictor {
    /// Resolve the model artifact named by `spec` and load it.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Artifact`] when the artifact is absent
    /// - [`LoadError::Deserialization`] when its bytes are not a model
    /// - [`LoadError::FeatureMismatch`] / [`LoadError::InvalidPackage`] when
    ///   the model and the declared contract disagree
    pub fn new(artifacts: &[Artifact], spec: PredictorSpec) -> Result<Self, LoadError> {
        let artifact = resolve(artifacts, &spec.model_artifact)?;
        let model = decode_model(artifact.bytes()).map_err(|source| {
            LoadError::Deserialization {
                artifact: artifact.name().to_string(),
                source,
            }
        })?;
        Self::from_model(model, spec)
    }

    /// Build from a package, using its manifest as the spec.
    pub fn from_package(package: &ModelPackage) -> Result<Self, LoadError> {
        Self::new(package.store().as_slice(), package.manifest().predictor.clone())
    }

    /// Read a package file and build its predictor.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let package = ModelPackage::load(path)?;
        Ok(Self::from_package(&package)?)
    }

    /// Wrap an already-loaded model.
    pub fn from_model(model: Box<dyn InferenceModel>, spec: PredictorSpec) -> Result<Self, LoadError> {
        let meta = model.meta();
        if meta.n_features != spec.schema.n_features() {
            return Err(LoadError::FeatureMismatch {
                model: meta.n_features,
                schema: spec.schema.n_features(),
            });
        }
        if let Some(names) = &meta.feature_names {
            if !names.iter().map(String::as_str).eq(spec.schema.names()) {
                return Err(LoadError::InvalidPackage(
                    "model feature names differ from the schema columns".into(),
                ));
            }
        }
        spec.output
            .validate()
            .map_err(|e| LoadError::InvalidPackage(e.to_string()))?;
        match (meta.task.is_classification(), spec.output.vocabulary.is_empty()) {
            (true, true) => {
                return Err(LoadError::InvalidPackage(
                    "classifier without an output vocabulary".into(),
                ))
            }
            (false, false) => {
                return Err(LoadError::InvalidPackage(
                    "regressor with an output vocabulary".into(),
                ))
            }
            _ => {}
        }

        tracing::info!(
            artifact = %spec.model_artifact,
            n_features = meta.n_features,
            task = ?meta.task,
            transform_steps = spec.transformer.steps().len(),
            "predictor ready"
        );
        Ok(Self { spec, model })
    }

    pub fn spec(&self) -> &PredictorSpec {
        &self.spec
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.spec.schema
    }

    pub fn output(&self) -> &OutputSpec {
        &self.spec.output
    }

    pub fn model(&self) -> &dyn InferenceModel {
        self.model.as_ref()
    }

    /// Transform a raw record and conform it to the feature schema.
    pub fn preprocess(&self, raw: &Record) -> Result<TransformedRecord<'_>, PredictError> {
        if self.spec.transformer.is_identity() {
            self.conform(raw)
        } else {
            let transformed = self.spec.transformer.transform_record(raw)?;
            self.conform(&transformed)
        }
    }

    /// Conform an already transformed record to the schema.
    fn conform(&self, record: &Record) -> Result<TransformedRecord<'_>, PredictError> {
        let schema = &self.spec.schema;
        let mut values = Array1::zeros(schema.n_features());
        let mut defaulted = Vec::new();

        for (i, column) in schema.iter().enumerate() {
            values[i] = match record.get(&column.name) {
                None | Some(Value::Null) => {
                    defaulted.push(i);
                    column.default
                }
                Some(v) => v.as_f64().ok_or_else(|| PredictError::SchemaViolation {
                    column: column.name.clone(),
                    value: v.clone(),
                })?,
            };
        }

        if !defaulted.is_empty() {
            tracing::debug!(n_defaulted = defaulted.len(), "filled absent columns with defaults");
        }
        Ok(TransformedRecord {
            schema,
            values,
            defaulted,
        })
    }

    /// Preprocess and invoke the model, without postprocessing.
    pub fn predict_raw(&self, raw: &Record) -> Result<Prediction, PredictError> {
        let row = self.preprocess(raw)?;
        Ok(self.model.predict(row.values().view())?)
    }

    /// Map a prediction to the output record.
    ///
    /// Class values outside the vocabulary become the unknown label.
    /// Regressor scores pass through as floats.
    pub fn postprocess(&self, prediction: &Prediction) -> Record {
        let output = &self.spec.output;
        let value = match prediction {
            Prediction::Class { class, .. } => match output.label(*class) {
                Some(label) => Value::Text(label.to_string()),
                None => {
                    tracing::warn!(
                        class,
                        field = %output.field,
                        "predicted class has no vocabulary entry"
                    );
                    Value::Text(output.unknown_label.clone())
                }
            },
            Prediction::Value { value } => Value::Float(*value),
        };
        Record::from([(output.field.clone(), value)])
    }

    /// Score one raw record.
    pub fn predict(&self, raw: &Record) -> Result<Record, PredictError> {
        let prediction = self.predict_raw(raw)?;
        Ok(self.postprocess(&prediction))
    }

    /// Whether `output` carries the unknown label in the output field.
    pub fn is_unknown(&self, output: &Record) -> bool {
        let spec = &self.spec.output;
        output
            .get(&spec.field)
            .and_then(Value::as_str)
            .is_some_and(|label| label == spec.unknown_label)
    }
}
