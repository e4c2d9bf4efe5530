//! Standardized linear model.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::{InferenceModel, ModelMeta};

/// Per-feature affine standardization, `(x - mean) / scale`.
///
/// Zero scales are treated as 1, matching how a scaler fitted on a
/// constant column behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        if mean.len() != scale.len() {
            return Err(format!(
                "standardizer has {} means but {} scales",
                mean.len(),
                scale.len()
            ));
        }
        if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err("standardizer has non-finite parameters".into());
        }
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self {
            mean: Array1::from(mean),
            scale: Array1::from_vec(scale),
        })
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }

    /// Standardize one row.
    #[inline]
    pub fn apply(&self, features: ArrayView1<'_, f64>) -> Array1<f64> {
        (&features - &self.mean) / &self.scale
    }
}

/// Linear model over standardized features.
///
/// Weights have shape `[n_features + 1, n_groups]`; the last row holds the
/// bias of each group:
///
/// ```text
/// margin[g] = sum_f z[f] * weights[[f, g]] + weights[[n_features, g]]
/// z = standardizer(x) if present, else x
/// ```
#[derive(Debug, Clone)]
pub struct LinearModel {
    standardizer: Option<Standardizer>,
    weights: Array2<f64>,
    meta: ModelMeta,
}

impl LinearModel {
    /// Create a model from a weight matrix (last row is the bias).
    pub fn new(weights: Array2<f64>, meta: ModelMeta) -> Result<Self, String> {
        Self::with_standardizer(weights, None, meta)
    }

    /// Create a model that standardizes its input first.
    pub fn with_standardizer(
        weights: Array2<f64>,
        standardizer: Option<Standardizer>,
        meta: ModelMeta,
    ) -> Result<Self, String> {
        meta.validate()?;
        if weights.nrows() != meta.n_features + 1 {
            return Err(format!(
                "weights have {} rows, expected n_features + 1 = {}",
                weights.nrows(),
                meta.n_features + 1
            ));
        }
        if weights.ncols() != meta.n_groups() {
            return Err(format!(
                "weights have {} columns, expected {} groups",
                weights.ncols(),
                meta.n_groups()
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err("weights contain non-finite values".into());
        }
        if let Some(std) = &standardizer {
            if std.n_features() != meta.n_features {
                return Err(format!(
                    "standardizer covers {} features, model has {}",
                    std.n_features(),
                    meta.n_features
                ));
            }
        }
        Ok(Self {
            standardizer,
            weights,
            meta,
        })
    }

    /// Number of input features.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.weights.nrows() - 1
    }

    /// Number of output groups.
    #[inline]
    pub fn n_groups(&self) -> usize {
        self.weights.ncols()
    }

    /// Coefficients without the bias row, `[n_features, n_groups]`.
    pub fn coefficients(&self) -> ArrayView2<'_, f64> {
        self.weights.slice(s![..self.n_features(), ..])
    }

    /// Bias per group.
    pub fn biases(&self) -> ArrayView1<'_, f64> {
        self.weights.row(self.n_features())
    }

    /// Full weight matrix including the bias row.
    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn standardizer(&self) -> Option<&Standardizer> {
        self.standardizer.as_ref()
    }
}

impl InferenceModel for LinearModel {
    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn margins(&self, features: ArrayView1<'_, f64>) -> Array1<f64> {
        let coefs = self.coefficients();
        let margins = match &self.standardizer {
            Some(std) => std.apply(features).dot(&coefs),
            None => features.dot(&coefs),
        };
        margins + &self.biases()
    }
}
