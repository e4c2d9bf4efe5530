//! Closed-vocabulary categorical remapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::TransformError;
use crate::error::ConfigError;
use crate::value::{Record, Value};

/// Replace a categorical column with its numeric code.
///
/// The vocabulary is the one seen at training time. Values outside it are
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalMap {
    /// Column to remap.
    pub column: String,
    /// Category key to code, e.g. `{"M": 1, "B": 0}`.
    pub mapping: BTreeMap<String, f64>,
    /// Write the code here instead of replacing the source column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CategoricalMap {
    pub fn new<K, I>(column: impl Into<String>, mapping: I) -> Result<Self, ConfigError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let map = Self {
            column: column.into(),
            mapping: mapping.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            output: None,
        };
        map.validate()?;
        Ok(map)
    }

    /// Write codes to a separate column, keeping the source.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.mapping.is_empty() {
            return Err(ConfigError::EmptyVocabulary(self.column.clone()));
        }
        if let Some((key, _)) = self.mapping.iter().find(|(_, code)| !code.is_finite()) {
            return Err(ConfigError::NonFiniteCode {
                column: self.column.clone(),
                key: key.clone(),
            });
        }
        Ok(())
    }

    /// Look up the code for a value.
    pub fn code(&self, value: &Value) -> Option<f64> {
        value
            .category_key()
            .and_then(|key| self.mapping.get(&key).copied())
    }

    pub fn apply(&self, record: &mut Record) -> Result<(), TransformError> {
        let value = match record.get(&self.column) {
            Some(v) if !v.is_null() => v,
            _ => {
                return Err(TransformError::MissingColumn {
                    column: self.column.clone(),
                })
            }
        };
        let code = self
            .code(value)
            .ok_or_else(|| TransformError::UnknownCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })?;
        let target = self.output.as_ref().unwrap_or(&self.column).clone();
        record.insert(target, Value::Float(code));
        Ok(())
    }
}
