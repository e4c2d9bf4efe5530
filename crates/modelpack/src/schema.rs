//! Input and output contracts of a packaged model.
//!
//! - [`FeatureSchema`]: the ordered columns (with defaults) the model was
//!   trained on.
//! - [`OutputSpec`]: the output field name and the vocabulary that turns raw
//!   class indices into domain labels.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label emitted when a prediction has no vocabulary entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Structural problems in a schema or output spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate feature column {0:?}")]
    DuplicateColumn(String),

    #[error("feature schema is empty")]
    Empty,

    #[error("default for column {column:?} is not finite")]
    NonFiniteDefault { column: String },

    #[error("vocabulary label {0:?} collides with the unknown sentinel")]
    SentinelCollision(String),

    #[error("output field name is empty")]
    EmptyOutputField,
}

// =============================================================================
// FeatureSchema
// =============================================================================

/// One model input column and the value used when a caller omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    #[serde(default)]
    pub default: f64,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// Ordered feature columns fixed at training time.
///
/// Column order is part of the contract: models consume feature vectors
/// positionally. The name index is built once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<FeatureColumn>", into = "Vec<FeatureColumn>")]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Build a schema from columns, validating names and defaults.
    pub fn new(columns: Vec<FeatureColumn>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if !col.default.is_finite() {
                return Err(SchemaError::NonFiniteDefault {
                    column: col.name.clone(),
                });
            }
            if index.insert(col.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns, index })
    }

    /// Build a schema from `(name, default)` pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Result<Self, SchemaError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, default)| FeatureColumn::new(name, default))
                .collect(),
        )
    }

    /// Schema where every column defaults to zero.
    pub fn zeros<K, I>(names: I) -> Result<Self, SchemaError>
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
    {
        Self::from_pairs(names.into_iter().map(|n| (n, 0.0)))
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, index: usize) -> Option<&FeatureColumn> {
        self.columns.get(index)
    }

    /// Position of a column by name.
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn defaults(&self) -> impl Iterator<Item = f64> + '_ {
        self.columns.iter().map(|c| c.default)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureColumn> {
        self.columns.iter()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl TryFrom<Vec<FeatureColumn>> for FeatureSchema {
    type Error = SchemaError;

    fn try_from(columns: Vec<FeatureColumn>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<FeatureSchema> for Vec<FeatureColumn> {
    fn from(schema: FeatureSchema) -> Self {
        schema.columns
    }
}

// =============================================================================
// OutputSpec
// =============================================================================

/// Mapping from raw class index to domain label.
pub type Vocabulary = BTreeMap<i64, String>;

/// Declared shape of the predictor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Name of the single output field, e.g. `"diagnosis"`.
    pub field: String,
    /// Class index to label. Empty for regressors, which emit the raw score.
    #[serde(default)]
    pub vocabulary: Vocabulary,
    /// Label used for class indices missing from the vocabulary.
    #[serde(default = "default_unknown")]
    pub unknown_label: String,
}

fn default_unknown() -> String {
    UNKNOWN_LABEL.to_string()
}

impl OutputSpec {
    /// Output spec for a classifier.
    pub fn labels<L, I>(field: impl Into<String>, vocabulary: I) -> Self
    where
        L: Into<String>,
        I: IntoIterator<Item = (i64, L)>,
    {
        Self {
            field: field.into(),
            vocabulary: vocabulary.into_iter().map(|(k, v)| (k, v.into())).collect(),
            unknown_label: default_unknown(),
        }
    }

    /// Output spec for a regressor.
    pub fn scalar(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            vocabulary: Vocabulary::new(),
            unknown_label: default_unknown(),
        }
    }

    pub fn with_unknown_label(mut self, label: impl Into<String>) -> Self {
        self.unknown_label = label.into();
        self
    }

    /// Label for a class index, or `None` when it is not declared.
    #[inline]
    pub fn label(&self, class: i64) -> Option<&str> {
        self.vocabulary.get(&class).map(String::as_str)
    }

    /// Check the sentinel stays distinguishable from real labels.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.field.is_empty() {
            return Err(SchemaError::EmptyOutputField);
        }
        if self.vocabulary.values().any(|l| *l == self.unknown_label) {
            return Err(SchemaError::SentinelCollision(self.unknown_label.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_keeps_order_and_defaults() {
        let schema = FeatureSchema::from_pairs([("a", 0.0), ("b", 1.5), ("c", -2.0)]).unwrap();
        assert_eq!(schema.n_features(), 3);
        assert_eq!(schema.names().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(schema.defaults().collect::<Vec<_>>(), [0.0, 1.5, -2.0]);
        assert_eq!(schema.index_of("c"), Some(2));
        assert_eq!(schema.index_of("z"), None);
    }

    #[test]
    fn schema_rejects_duplicates_and_empty() {
        assert_eq!(
            FeatureSchema::zeros(["a", "a"]).unwrap_err(),
            SchemaError::DuplicateColumn("a".into())
        );
        assert_eq!(
            FeatureSchema::zeros(Vec::<String>::new()).unwrap_err(),
            SchemaError::Empty
        );
        assert!(matches!(
            FeatureSchema::from_pairs([("a", f64::NAN)]),
            Err(SchemaError::NonFiniteDefault { .. })
        ));
    }

    #[test]
    fn schema_serde_is_a_column_list() {
        let schema = FeatureSchema::from_pairs([("a", 0.0), ("b", 2.0)]).unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"a","default":0.0},{"name":"b","default":2.0}]"#
        );
        let back: FeatureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
        assert_eq!(back.index_of("b"), Some(1));

        let dup = serde_json::from_str::<FeatureSchema>(r#"[{"name":"a"},{"name":"a"}]"#);
        assert!(dup.is_err());
    }

    #[test]
    fn default_is_optional_in_json() {
        let schema: FeatureSchema = serde_json::from_str(r#"[{"name":"x"}]"#).unwrap();
        assert_eq!(schema.column(0).unwrap().default, 0.0);
    }

    #[test]
    fn output_labels() {
        let spec = OutputSpec::labels("diagnosis", [(0, "Benign"), (1, "Malignant")]);
        assert_eq!(spec.label(0), Some("Benign"));
        assert_eq!(spec.label(1), Some("Malignant"));
        assert_eq!(spec.label(2), None);
        assert_eq!(spec.unknown_label, UNKNOWN_LABEL);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn output_rejects_sentinel_collision() {
        let spec = OutputSpec::labels("y", [(0, "Unknown")]);
        assert_eq!(
            spec.validate().unwrap_err(),
            SchemaError::SentinelCollision("Unknown".into())
        );
        assert!(spec.with_unknown_label("<unmapped>").validate().is_ok());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn types_are_send_sync() {
        assert_send_sync::<FeatureSchema>();
        assert_send_sync::<OutputSpec>();
    }
}
