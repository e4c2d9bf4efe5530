//! Crate-level error types.
//!
//! Each concern has its own error enum next to its code
//! ([`ArtifactError`](crate::artifact::ArtifactError),
//! [`TransformError`](crate::transform::TransformError),
//! [`PredictError`](crate::predictor::PredictError), ...). This module holds
//! the configuration error shared by builders and the umbrella [`Error`]
//! returned by [`ModelPackage::load`](crate::package::ModelPackage::load) and
//! [`Predictor::load`](crate::predictor::Predictor::load).

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::package::FormatError;
use crate::predictor::LoadError;
use crate::schema::SchemaError;

/// Invalid builder or declarative configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} step needs at least one column")]
    EmptyColumns(&'static str),

    #[error("column {0:?} listed twice")]
    DuplicateColumn(String),

    #[error("polynomial degree must be at least 1, got {0}")]
    InvalidDegree(u32),

    #[error("expansion would generate more than {0} terms")]
    TooManyTerms(usize),

    #[error("categorical vocabulary for {0:?} is empty")]
    EmptyVocabulary(String),

    #[error("code for category {key:?} of column {column:?} is not finite")]
    NonFiniteCode { column: String, key: String },

    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,
}

/// Anything that can go wrong between a package file and a ready predictor.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Result alias for package-level operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
