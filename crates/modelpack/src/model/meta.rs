//! Model metadata.
//!
//! Shared metadata types for model introspection.

use serde::{Deserialize, Serialize};

use super::OutputTransform;

/// Largest class count a model may declare.
pub const MAX_CLASSES: usize = u16::MAX as usize;

/// Type of machine learning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskKind {
    /// Regression (continuous target).
    #[default]
    Regression,
    /// Binary classification (2 classes, one margin).
    BinaryClassification,
    /// Multi-class classification (3+ classes, one margin per class).
    MulticlassClassification {
        /// Number of classes.
        n_classes: usize,
    },
}

impl TaskKind {
    /// Returns the number of output groups (margins per row) for this task.
    pub fn n_groups(&self) -> usize {
        match self {
            Self::Regression => 1,
            Self::BinaryClassification => 1,
            Self::MulticlassClassification { n_classes } => *n_classes,
        }
    }

    /// Number of distinct classes; 0 for regression.
    pub fn n_classes(&self) -> usize {
        match self {
            Self::Regression => 0,
            Self::BinaryClassification => 2,
            Self::MulticlassClassification { n_classes } => *n_classes,
        }
    }

    /// Returns true if this is a classification task.
    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::BinaryClassification | Self::MulticlassClassification { .. }
        )
    }

    /// Output transform conventionally paired with this task.
    pub fn default_transform(&self) -> OutputTransform {
        match self {
            Self::Regression => OutputTransform::Identity,
            Self::BinaryClassification => OutputTransform::Sigmoid,
            Self::MulticlassClassification { .. } => OutputTransform::Softmax,
        }
    }
}

/// Shared metadata for all model types.
///
/// `classes` maps a class position (0-based, as the model orders its
/// outputs) to the raw class value that the output vocabulary is keyed by.
/// When empty, positions are used as class values directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Number of input features.
    pub n_features: usize,
    /// Task type.
    pub task: TaskKind,
    /// Class values in output order.
    pub classes: Vec<i64>,
    /// Margin to score transformation.
    pub output_transform: OutputTransform,
    /// Feature names (optional, informational).
    pub feature_names: Option<Vec<String>>,
}

impl ModelMeta {
    /// Create metadata for a regression task.
    pub fn for_regression(n_features: usize) -> Self {
        Self {
            n_features,
            task: TaskKind::Regression,
            ..Default::default()
        }
    }

    /// Create metadata for binary classification.
    pub fn for_binary_classification(n_features: usize) -> Self {
        Self {
            n_features,
            task: TaskKind::BinaryClassification,
            output_transform: OutputTransform::Sigmoid,
            ..Default::default()
        }
    }

    /// Create metadata for multi-class classification.
    pub fn for_multiclass(n_features: usize, n_classes: usize) -> Self {
        Self {
            n_features,
            task: TaskKind::MulticlassClassification { n_classes },
            output_transform: OutputTransform::Softmax,
            ..Default::default()
        }
    }

    /// Set explicit class values.
    pub fn with_classes(mut self, classes: Vec<i64>) -> Self {
        self.classes = classes;
        self
    }

    /// Set feature names.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Number of output groups.
    #[inline]
    pub fn n_groups(&self) -> usize {
        self.task.n_groups()
    }

    /// Raw class value for an output position.
    #[inline]
    pub fn class_value(&self, position: usize) -> i64 {
        self.classes
            .get(position)
            .copied()
            .unwrap_or(position as i64)
    }

    /// Check internal consistency.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("model has no input features".into());
        }
        if let TaskKind::MulticlassClassification { n_classes } = self.task {
            if !(2..=MAX_CLASSES).contains(&n_classes) {
                return Err(format!("multiclass model with {n_classes} classes"));
            }
        }
        if !self.classes.is_empty() {
            if !self.task.is_classification() {
                return Err("regression model declares class values".into());
            }
            if self.classes.len() != self.task.n_classes() {
                return Err(format!(
                    "{} class values for a {}-class model",
                    self.classes.len(),
                    self.task.n_classes()
                ));
            }
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.n_features {
                return Err(format!(
                    "{} feature names for {} features",
                    names.len(),
                    self.n_features
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_groups() {
        assert_eq!(TaskKind::Regression.n_groups(), 1);
        assert_eq!(TaskKind::BinaryClassification.n_groups(), 1);
        assert_eq!(TaskKind::BinaryClassification.n_classes(), 2);
        assert_eq!(
            TaskKind::MulticlassClassification { n_classes: 4 }.n_groups(),
            4
        );
    }

    #[test]
    fn class_value_falls_back_to_position() {
        let meta = ModelMeta::for_binary_classification(3);
        assert_eq!(meta.class_value(1), 1);
        let meta = meta.with_classes(vec![-1, 7]);
        assert_eq!(meta.class_value(0), -1);
        assert_eq!(meta.class_value(1), 7);
    }

    #[test]
    fn validate_catches_inconsistencies() {
        assert!(ModelMeta::for_regression(0).validate().is_err());
        assert!(ModelMeta::for_multiclass(2, 1).validate().is_err());
        assert!(ModelMeta::for_multiclass(2, MAX_CLASSES).validate().is_ok());
        assert!(ModelMeta::for_multiclass(2, MAX_CLASSES + 1).validate().is_err());
        assert!(ModelMeta::for_multiclass(2, 3)
            .with_classes(vec![0, 1])
            .validate()
            .is_err());
        assert!(ModelMeta::for_regression(2)
            .with_feature_names(vec!["a".into()])
            .validate()
            .is_err());
        assert!(ModelMeta::for_binary_classification(2)
            .with_classes(vec![0, 1])
            .validate()
            .is_ok());
    }
}
