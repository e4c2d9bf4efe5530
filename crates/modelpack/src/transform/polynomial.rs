//! Polynomial and interaction feature expansion.
//!
//! Generated terms follow scikit-learn's `PolynomialFeatures` ordering so a
//! model fitted on its output sees the same columns here:
//!
//! ```text
//! columns = [x0, x1], degree = 2, include_bias = true
//! poly_0 = 1
//! poly_1 = x0        poly_2 = x1
//! poly_3 = x0 * x0   poly_4 = x0 * x1   poly_5 = x1 * x1
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::{numeric_input, TransformError};
use crate::error::ConfigError;
use crate::value::{Record, Value};

/// Hard cap on generated columns.
const MAX_TERMS: usize = 1 << 16;

/// Declarative parameters of a polynomial expansion.
///
/// Build with [`PolynomialParams::builder`]; `build()` validates and
/// precomputes the term list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct PolynomialParams {
    /// Source columns, in the order they were passed at training time.
    pub columns: Vec<String>,

    /// Maximum total degree. Default: 2.
    #[builder(default = 2)]
    #[serde(default = "default_degree")]
    pub degree: u32,

    /// Emit the constant `1` term first. Default: false.
    #[builder(default)]
    #[serde(default)]
    pub include_bias: bool,

    /// Only products of distinct columns (no powers). Default: false.
    #[builder(default)]
    #[serde(default)]
    pub interaction_only: bool,

    /// Prefix of generated column names. Default: `"poly_"`.
    #[builder(default = default_prefix(), into)]
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_degree() -> u32 {
    2
}

fn default_prefix() -> String {
    "poly_".to_string()
}

impl<S: polynomial_params_builder::IsComplete> PolynomialParamsBuilder<S> {
    /// Validate parameters and precompute the expansion terms.
    ///
    /// # Errors
    ///
    /// - no source columns, or a repeated source column
    /// - `degree == 0`
    /// - more than 65536 generated terms
    pub fn build(self) -> Result<PolynomialExpansion, ConfigError> {
        PolynomialExpansion::new(self.__build_internal())
    }
}

/// Compiled polynomial expansion.
///
/// Serializes as its [`PolynomialParams`]; the term list is rebuilt on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolynomialParams", into = "PolynomialParams")]
pub struct PolynomialExpansion {
    params: PolynomialParams,
    /// Source column indices per output term; empty slice is the bias term.
    terms: Vec<Box<[usize]>>,
}

impl PolynomialExpansion {
    pub fn new(params: PolynomialParams) -> Result<Self, ConfigError> {
        if params.columns.is_empty() {
            return Err(ConfigError::EmptyColumns("polynomial"));
        }
        for (i, c) in params.columns.iter().enumerate() {
            if params.columns[..i].contains(c) {
                return Err(ConfigError::DuplicateColumn(c.clone()));
            }
        }
        if params.degree == 0 {
            return Err(ConfigError::InvalidDegree(params.degree));
        }
        let terms = expansion_terms(
            params.columns.len(),
            params.degree as usize,
            params.include_bias,
            params.interaction_only,
        )?;
        Ok(Self { params, terms })
    }

    pub fn params(&self) -> &PolynomialParams {
        &self.params
    }

    /// Number of generated columns.
    pub fn n_outputs(&self) -> usize {
        self.terms.len()
    }

    /// Generated column names, `{prefix}{position}`.
    pub fn output_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.terms.len()).map(move |i| format!("{}{}", self.params.prefix, i))
    }

    /// Append the generated columns to `record`.
    ///
    /// Existing fields with a generated name are overwritten.
    pub fn apply(&self, record: &mut Record) -> Result<(), TransformError> {
        let inputs = self
            .params
            .columns
            .iter()
            .map(|c| numeric_input(record, c))
            .collect::<Result<Vec<f64>, _>>()?;

        for (i, term) in self.terms.iter().enumerate() {
            let value = term.iter().fold(1.0f64, |acc, &idx| acc * inputs[idx]);
            record.insert(format!("{}{}", self.params.prefix, i), Value::Float(value));
        }
        Ok(())
    }
}

impl TryFrom<PolynomialParams> for PolynomialExpansion {
    type Error = ConfigError;

    fn try_from(params: PolynomialParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<PolynomialExpansion> for PolynomialParams {
    fn from(expansion: PolynomialExpansion) -> Self {
        expansion.params
    }
}

/// Enumerate index combinations for every degree up to `degree`.
///
/// Within one degree the combinations come out in lexicographic order,
/// with replacement unless `interaction_only` is set.
fn expansion_terms(
    n_inputs: usize,
    degree: usize,
    include_bias: bool,
    interaction_only: bool,
) -> Result<Vec<Box<[usize]>>, ConfigError> {
    let mut terms: Vec<Box<[usize]>> = Vec::new();
    if include_bias {
        terms.push(Box::new([]));
    }

    for d in 1..=degree {
        if interaction_only && d > n_inputs {
            break;
        }
        let mut combo: Vec<usize> = if interaction_only {
            (0..d).collect()
        } else {
            vec![0; d]
        };
        loop {
            terms.push(combo.clone().into_boxed_slice());
            if terms.len() > MAX_TERMS {
                return Err(ConfigError::TooManyTerms(MAX_TERMS));
            }
            if !next_combination(&mut combo, n_inputs, interaction_only) {
                break;
            }
        }
    }
    Ok(terms)
}

/// Advance `combo` to the next non-decreasing (or strictly increasing)
/// index tuple. Returns false once exhausted.
fn next_combination(combo: &mut [usize], n: usize, strict: bool) -> bool {
    let d = combo.len();
    let mut pos = d;
    while pos > 0 {
        pos -= 1;
        let limit = if strict { n - (d - pos) } else { n - 1 };
        if combo[pos] < limit {
            combo[pos] += 1;
            for j in pos + 1..d {
                combo[j] = if strict { combo[j - 1] + 1 } else { combo[pos] };
            }
            return true;
        }
    }
    false
}
