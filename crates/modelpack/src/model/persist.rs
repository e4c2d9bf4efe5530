//! Model artifact serialization.
//!
//! Schema types here are separate from the runtime types so the stored
//! layout can evolve on its own; conversion validates everything a runtime
//! constructor would. They avoid serde attributes that need a
//! self-describing format, so the same schema encodes with postcard (inside
//! an `MPKM` envelope) and with JSON (for hand-written fixtures).
//!
//! JSON shape:
//!
//! ```json
//! {
//!   "v1": {
//!     "meta": { "n_features": 2, "task": "BinaryClassification", "output_transform": "Sigmoid" },
//!     "body": { "linear": { "weights": [0.5, -0.25, 0.1] } }
//!   }
//! }
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Forest, ForestError, InferenceModel, LinearModel, ModelMeta, OutputTransform, Standardizer,
    TaskKind, Tree,
};
use crate::package::format::{has_magic, looks_like_json, EnvelopeCodec, FormatError};

/// Magic bytes of a binary model artifact.
pub const MODEL_MAGIC: &[u8; 4] = b"MPKM";

/// Errors turning artifact bytes into an invocable model.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("invalid linear model: {0}")]
    Linear(String),

    #[error("invalid tree ensemble: {0}")]
    Forest(#[from] ForestError),
}

/// On-disk representation of a model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelEncoding {
    /// `MPKM` envelope around a postcard payload.
    #[default]
    Binary,
    /// Pretty-printed JSON.
    Json,
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModelPayload {
    V1(ModelSchema),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelSchema {
    meta: ModelMetaSchema,
    body: ModelBodySchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelMetaSchema {
    n_features: u32,
    task: TaskKind,
    #[serde(default)]
    classes: Vec<i64>,
    #[serde(default)]
    output_transform: OutputTransform,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModelBodySchema {
    Linear(LinearSchema),
    Forest(ForestSchema),
}

/// Weights row-major `[n_features + 1, n_groups]`, bias row last.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearSchema {
    weights: Vec<f64>,
    #[serde(default)]
    standardizer: Option<StandardizerSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StandardizerSchema {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestSchema {
    trees: Vec<TreeSchema>,
    #[serde(default)]
    tree_groups: Vec<u32>,
    #[serde(default)]
    base_score: Vec<f64>,
}

/// Tree schema (SoA layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeSchema {
    split_indices: Vec<u32>,
    thresholds: Vec<f64>,
    children_left: Vec<u32>,
    children_right: Vec<u32>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
}

// =============================================================================
// Runtime <-> schema
// =============================================================================

impl From<&ModelMeta> for ModelMetaSchema {
    fn from(meta: &ModelMeta) -> Self {
        Self {
            n_features: meta.n_features as u32,
            task: meta.task,
            classes: meta.classes.clone(),
            output_transform: meta.output_transform,
            feature_names: meta.feature_names.clone(),
        }
    }
}

impl From<ModelMetaSchema> for ModelMeta {
    fn from(schema: ModelMetaSchema) -> Self {
        Self {
            n_features: schema.n_features as usize,
            task: schema.task,
            classes: schema.classes,
            output_transform: schema.output_transform,
            feature_names: schema.feature_names,
        }
    }
}

impl From<&Tree> for TreeSchema {
    fn from(tree: &Tree) -> Self {
        Self {
            split_indices: tree.split_indices().to_vec(),
            thresholds: tree.thresholds().to_vec(),
            children_left: tree.left_children().to_vec(),
            children_right: tree.right_children().to_vec(),
            default_left: tree.default_lefts().to_vec(),
            is_leaf: tree.leaf_flags().to_vec(),
            leaf_values: tree.leaf_values().to_vec(),
        }
    }
}

impl From<&LinearModel> for ModelSchema {
    fn from(model: &LinearModel) -> Self {
        Self {
            meta: model.meta().into(),
            body: ModelBodySchema::Linear(LinearSchema {
                weights: model.weights().iter().copied().collect(),
                standardizer: model.standardizer().map(|s| StandardizerSchema {
                    mean: s.mean().to_vec(),
                    scale: s.scale().to_vec(),
                }),
            }),
        }
    }
}

impl From<&Forest> for ModelSchema {
    fn from(forest: &Forest) -> Self {
        Self {
            meta: forest.meta().into(),
            body: ModelBodySchema::Forest(ForestSchema {
                trees: forest.trees().map(TreeSchema::from).collect(),
                tree_groups: forest.tree_groups().to_vec(),
                base_score: forest.base_score().to_vec(),
            }),
        }
    }
}

impl ModelSchema {
    fn into_model(self) -> Result<ModelArtifact, DecodeError> {
        let meta = ModelMeta::from(self.meta);
        match self.body {
            ModelBodySchema::Linear(linear) => {
                meta.validate().map_err(DecodeError::Linear)?;
                let shape = (meta.n_features + 1, meta.n_groups());
                let weights = Array2::from_shape_vec(shape, linear.weights)
                    .map_err(|e| DecodeError::Linear(e.to_string()))?;
                let standardizer = linear
                    .standardizer
                    .map(|s| Standardizer::new(s.mean, s.scale))
                    .transpose()
                    .map_err(DecodeError::Linear)?;
                let model = LinearModel::with_standardizer(weights, standardizer, meta)
                    .map_err(DecodeError::Linear)?;
                Ok(ModelArtifact::Linear(model))
            }
            ModelBodySchema::Forest(schema) => {
                meta.validate().map_err(ForestError::Meta)?;
                let n_groups = meta.n_groups();
                let trees = schema
                    .trees
                    .into_iter()
                    .enumerate()
                    .map(|(idx, t)| {
                        Tree::from_parts(
                            t.split_indices,
                            t.thresholds,
                            t.children_left,
                            t.children_right,
                            t.default_left,
                            t.is_leaf,
                            t.leaf_values,
                        )
                        .map_err(|source| ForestError::InvalidTree { tree: idx, source })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                // single-group forests may omit assignments and base score
                let tree_groups = if schema.tree_groups.is_empty() && n_groups == 1 {
                    vec![0; trees.len()]
                } else {
                    schema.tree_groups
                };
                let base_score = if schema.base_score.is_empty() {
                    vec![0.0; n_groups]
                } else {
                    schema.base_score
                };
                let forest = Forest::from_parts(meta, trees, tree_groups, base_score)?;
                Ok(ModelArtifact::Forest(forest))
            }
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// A concrete model that can be stored as an artifact.
#[derive(Debug, Clone)]
pub enum ModelArtifact {
    Linear(LinearModel),
    Forest(Forest),
}

impl From<LinearModel> for ModelArtifact {
    fn from(model: LinearModel) -> Self {
        ModelArtifact::Linear(model)
    }
}

impl From<Forest> for ModelArtifact {
    fn from(forest: Forest) -> Self {
        ModelArtifact::Forest(forest)
    }
}

impl ModelArtifact {
    fn schema(&self) -> ModelSchema {
        match self {
            ModelArtifact::Linear(m) => m.into(),
            ModelArtifact::Forest(f) => f.into(),
        }
    }

    pub fn meta(&self) -> &ModelMeta {
        match self {
            ModelArtifact::Linear(m) => m.meta(),
            ModelArtifact::Forest(f) => f.meta(),
        }
    }

    /// Serialize to artifact bytes.
    pub fn encode(&self, encoding: ModelEncoding) -> Result<Vec<u8>, FormatError> {
        let payload = ModelPayload::V1(self.schema());
        match encoding {
            ModelEncoding::Binary => {
                let n_features = u32::try_from(self.meta().n_features)
                    .map_err(|_| FormatError::Corrupt("too many features".into()))?;
                EnvelopeCodec::new().encode(*MODEL_MAGIC, n_features, &payload)
            }
            ModelEncoding::Json => Ok(serde_json::to_vec_pretty(&payload)?),
        }
    }

    /// Parse artifact bytes, detecting binary or JSON encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let payload: ModelPayload = if has_magic(bytes, MODEL_MAGIC) {
            let (header, payload) = EnvelopeCodec::new().decode::<ModelPayload>(bytes, MODEL_MAGIC)?;
            let ModelPayload::V1(schema) = &payload;
            if header.count != schema.meta.n_features {
                return Err(FormatError::Corrupt(format!(
                    "header declares {} features, payload {}",
                    header.count, schema.meta.n_features
                ))
                .into());
            }
            payload
        } else if looks_like_json(bytes) {
            serde_json::from_slice(bytes).map_err(FormatError::from)?
        } else {
            return Err(FormatError::BadMagic {
                expected: String::from_utf8_lossy(MODEL_MAGIC).into_owned(),
                found: String::from_utf8_lossy(&bytes[..bytes.len().min(4)]).into_owned(),
            }
            .into());
        };

        match payload {
            ModelPayload::V1(schema) => schema.into_model(),
        }
    }

    /// Erase the concrete type.
    pub fn into_boxed(self) -> Box<dyn InferenceModel> {
        match self {
            ModelArtifact::Linear(m) => Box::new(m),
            ModelArtifact::Forest(f) => Box::new(f),
        }
    }
}

/// Serialize a model to artifact bytes.
pub fn encode_model(
    model: impl Into<ModelArtifact>,
    encoding: ModelEncoding,
) -> Result<Vec<u8>, FormatError> {
    model.into().encode(encoding)
}

/// Deserialize artifact bytes into an invocable model.
pub fn decode_model(bytes: &[u8]) -> Result<Box<dyn InferenceModel>, DecodeError> {
    ModelArtifact::decode(bytes).map(ModelArtifact::into_boxed)
}
