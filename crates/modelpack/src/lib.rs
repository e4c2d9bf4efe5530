//! modelpack: schema-enforced prediction pipelines around packaged models.
//!
//! A trained model is shipped together with the contract it was trained
//! under: the ordered feature schema with per-column defaults, the feature
//! transformation replayed before inference, and the output vocabulary.
//! Callers send open records; the model always receives exactly the feature
//! vector it was fitted on.
//!
//! # Key Types
//!
//! - [`ModelPackage`] - manifest plus named artifacts, in a checksummed file
//! - [`Predictor`] - one loaded model behind `predict(record) -> record`
//! - [`PipelineRunner`] - batch scoring with per-record failure isolation
//! - [`FeatureTransformer`] - declarative training-time preprocessing
//! - [`LinearModel`] / [`Forest`] - model formats behind [`InferenceModel`]
//!
//! # Example
//!
//! ```no_run
//! use modelpack::{ModelPackage, PipelineRunner, Predictor, RunnerConfig};
//! use modelpack::value::{record, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let package = ModelPackage::load("breast_cancer.mpkg")?;
//! let predictor = Predictor::from_package(&package)?;
//!
//! let out = predictor.predict(&record([("radius_mean", Value::from(17.9))]))?;
//! println!("{out:?}");
//!
//! let runner = PipelineRunner::new(RunnerConfig::builder().chunk_size(64).build()?);
//! let report = runner.run(&predictor, &[record([("radius_mean", Value::from(11.2))])]);
//! assert_eq!(report.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod error;
pub mod eval;
pub mod logging;
pub mod model;
pub mod package;
pub mod predictor;
pub mod runner;
pub mod schema;
pub mod testing;
pub mod transform;
pub mod utils;
pub mod value;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Artifacts and packages
pub use artifact::{resolve, Artifact, ArtifactError, ArtifactKind, ArtifactStore};
pub use package::{ModelPackage, PackageManifest};

// Contract types
pub use schema::{FeatureColumn, FeatureSchema, OutputSpec, UNKNOWN_LABEL};
pub use transform::{FeatureTransformer, TransformError, TransformStep};
pub use value::{Record, Value};

// Models
pub use model::{Forest, InferenceModel, LinearModel, ModelMeta, Prediction, TaskKind};

// Serving
pub use eval::ClassificationReport;
pub use predictor::{LoadError, PredictError, Predictor, PredictorSpec};
pub use runner::{CancellationToken, FailureKind, PipelineRunner, RunReport, RunnerConfig};

// Errors
pub use error::{ConfigError, Error, Result};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
