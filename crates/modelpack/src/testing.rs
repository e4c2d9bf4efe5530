//! Fixtures shared by unit tests, integration tests and benchmarks.
//!
//! Two packages are provided:
//!
//! - the `abc` classifier: three zero-default columns `[a, b, c]`, an
//!   unstandardized logistic model and the `{0: Benign, 1: Malignant}`
//!   vocabulary;
//! - the `tumour` package: a categorical remap, a degree 2 polynomial
//!   expansion over three "worst" measurements, a drop of those sources, and
//!   a standardized logistic model over the twelve resulting columns.
//!
//! ```
//! use modelpack::testing::{abc_predictor, label_of, MALIGNANT};
//! use modelpack::value::{record, Value};
//!
//! let out = abc_predictor().predict(&record([("a", Value::from(5))])).unwrap();
//! assert_eq!(label_of(&out), Some(MALIGNANT));
//! ```
//!
//! # Panics
//!
//! Fixture constructors panic if the fixture itself is inconsistent. They
//! are test support, not library API.

use ndarray::{arr2, Array2};

use crate::artifact::{Artifact, ArtifactKind};
use crate::model::{encode_model, LinearModel, ModelEncoding, ModelMeta, Standardizer};
use crate::package::{ModelPackage, PackageManifest};
use crate::predictor::{Predictor, PredictorSpec};
use crate::schema::{FeatureColumn, FeatureSchema, OutputSpec};
use crate::transform::{CategoricalMap, FeatureTransformer, PolynomialParams, TransformStep};
use crate::value::{record, Record, Value};

/// Name of the model artifact in every fixture.
pub const MODEL_ARTIFACT: &str = "model.bin";

/// Output field of every fixture.
pub const OUTPUT_FIELD: &str = "diagnosis";

pub const BENIGN: &str = "Benign";
pub const MALIGNANT: &str = "Malignant";

/// `{0: Benign, 1: Malignant}` on [`OUTPUT_FIELD`].
pub fn diagnosis_output() -> OutputSpec {
    OutputSpec::labels(OUTPUT_FIELD, [(0, BENIGN), (1, MALIGNANT)])
}

/// Extract the output label from a predictor output.
pub fn label_of(output: &Record) -> Option<&str> {
    output.get(OUTPUT_FIELD).and_then(Value::as_str)
}

// =============================================================================
// abc classifier
// =============================================================================

/// `margin = a - b + 0.5 c - 2`: `{a: 5}` is malignant, `{}` is benign.
pub fn abc_model() -> LinearModel {
    LinearModel::new(
        arr2(&[[1.0], [-1.0], [0.5], [-2.0]]),
        ModelMeta::for_binary_classification(3),
    )
    .expect("abc model is consistent")
}

pub fn abc_schema() -> FeatureSchema {
    FeatureSchema::zeros(["a", "b", "c"]).expect("abc schema is valid")
}

pub fn abc_spec() -> PredictorSpec {
    PredictorSpec::builder()
        .model_artifact(MODEL_ARTIFACT)
        .schema(abc_schema())
        .output(diagnosis_output())
        .build()
}

/// The serialized abc model plus an unrelated artifact.
pub fn abc_artifacts() -> Vec<Artifact> {
    let bytes = encode_model(abc_model(), ModelEncoding::Binary).expect("abc model encodes");
    vec![
        Artifact::new(MODEL_ARTIFACT, bytes).with_kind(ArtifactKind::Model),
        Artifact::new("README.txt", b"abc fixture".to_vec()),
    ]
}

pub fn abc_predictor() -> Predictor {
    Predictor::new(&abc_artifacts(), abc_spec()).expect("abc predictor loads")
}

// =============================================================================
// tumour package
// =============================================================================

/// Measurements expanded into `poly_0 ..= poly_8` and then dropped.
pub const WORST_COLUMNS: [&str; 3] = ["perimeter_worst", "radius_worst", "concave points_worst"];

/// Categorical step, polynomial expansion, drop.
pub fn tumour_transformer() -> FeatureTransformer {
    let worst: Vec<String> = WORST_COLUMNS.iter().map(|c| c.to_string()).collect();
    FeatureTransformer::new(vec![
        TransformStep::Categorical(
            CategoricalMap::new("laterality", [("L", 0.0), ("R", 1.0)])
                .expect("laterality vocabulary is valid"),
        ),
        TransformStep::Polynomial(
            PolynomialParams::builder()
                .columns(worst.clone())
                .degree(2)
                .build()
                .expect("polynomial params are valid"),
        ),
        TransformStep::Drop { columns: worst },
    ])
    .expect("tumour transformer is valid")
}

/// `(column, default, mean, scale, weight)` of every model input.
const TUMOUR_FEATURES: [(&str, f64, f64, f64, f64); 12] = [
    ("radius_mean", 14.1, 14.1, 3.5, 0.9),
    ("texture_mean", 19.3, 19.3, 4.3, 0.6),
    ("laterality", 0.0, 0.5, 0.5, 0.0),
    ("poly_0", 107.3, 107.3, 33.6, 0.8),
    ("poly_1", 16.3, 16.3, 4.8, 0.9),
    ("poly_2", 0.115, 0.115, 0.066, 1.2),
    ("poly_3", 12600.0, 12600.0, 8000.0, 0.3),
    ("poly_4", 1850.0, 1850.0, 1150.0, 0.3),
    ("poly_5", 13.5, 13.5, 10.0, 0.4),
    ("poly_6", 290.0, 290.0, 170.0, 0.3),
    ("poly_7", 2.0, 2.0, 1.5, 0.4),
    ("poly_8", 0.0175, 0.0175, 0.016, 0.2),
];

const TUMOUR_BIAS: f64 = -0.4;

pub fn tumour_schema() -> FeatureSchema {
    FeatureSchema::new(
        TUMOUR_FEATURES
            .iter()
            .map(|&(name, default, ..)| FeatureColumn::new(name, default))
            .collect(),
    )
    .expect("tumour schema is valid")
}

pub fn tumour_model() -> LinearModel {
    let names = TUMOUR_FEATURES.iter().map(|f| f.0.to_string()).collect();
    let meta = ModelMeta::for_binary_classification(TUMOUR_FEATURES.len()).with_feature_names(names);

    let mut weights = Array2::zeros((TUMOUR_FEATURES.len() + 1, 1));
    for (i, f) in TUMOUR_FEATURES.iter().enumerate() {
        weights[[i, 0]] = f.4;
    }
    weights[[TUMOUR_FEATURES.len(), 0]] = TUMOUR_BIAS;

    let standardizer = Standardizer::new(
        TUMOUR_FEATURES.iter().map(|f| f.2).collect(),
        TUMOUR_FEATURES.iter().map(|f| f.3).collect(),
    )
    .expect("standardizer is valid");

    LinearModel::with_standardizer(weights, Some(standardizer), meta).expect("tumour model is consistent")
}

pub fn tumour_spec() -> PredictorSpec {
    PredictorSpec::builder()
        .model_artifact(MODEL_ARTIFACT)
        .schema(tumour_schema())
        .output(diagnosis_output())
        .transformer(tumour_transformer())
        .build()
}

/// Complete package with manifest and model artifact.
pub fn tumour_package() -> ModelPackage {
    let bytes = encode_model(tumour_model(), ModelEncoding::Binary).expect("tumour model encodes");
    let manifest = PackageManifest::new("breast-cancer-logistic", tumour_spec())
        .with_attribute("algorithm", "logistic_regression");
    ModelPackage::new(
        manifest,
        vec![Artifact::new(MODEL_ARTIFACT, bytes).with_kind(ArtifactKind::Model)],
    )
    .expect("tumour package is consistent")
}

pub fn tumour_predictor() -> Predictor {
    Predictor::from_package(&tumour_package()).expect("tumour predictor loads")
}

/// One raw tumour record.
pub fn tumour_record(
    laterality: &str,
    radius_mean: f64,
    texture_mean: f64,
    worst: [f64; 3],
) -> Record {
    record([
        ("radius_mean", Value::from(radius_mean)),
        ("texture_mean", Value::from(texture_mean)),
        ("laterality", Value::from(laterality)),
        (WORST_COLUMNS[0], Value::from(worst[0])),
        (WORST_COLUMNS[1], Value::from(worst[1])),
        (WORST_COLUMNS[2], Value::from(worst[2])),
    ])
}

/// Small, low-texture tumour. Scores clearly benign.
pub fn benign_record() -> Record {
    tumour_record("L", 12.0, 17.0, [80.0, 13.0, 0.07])
}

/// Large, irregular tumour. Scores clearly malignant.
pub fn malignant_record() -> Record {
    tumour_record("R", 20.0, 25.0, [150.0, 24.0, 0.22])
}

/// Deterministic batch sweeping from the benign to the malignant profile.
pub fn tumour_batch(n: usize) -> Vec<Record> {
    let lerp = |lo: f64, hi: f64, t: f64| lo + (hi - lo) * t;
    (0..n)
        .map(|i| {
            let t = (i % 10) as f64 / 9.0;
            tumour_record(
                if i % 2 == 0 { "L" } else { "R" },
                lerp(12.0, 20.0, t),
                lerp(17.0, 25.0, t),
                [lerp(80.0, 150.0, t), lerp(13.0, 24.0, t), lerp(0.07, 0.22, t)],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abc_fixture_scores_both_classes() {
        let predictor = abc_predictor();
        let hi = predictor.predict(&record([("a", Value::from(5.0))])).unwrap();
        let lo = predictor.predict(&Record::new()).unwrap();
        assert_eq!(label_of(&hi), Some(MALIGNANT));
        assert_eq!(label_of(&lo), Some(BENIGN));
    }

    #[test]
    fn tumour_fixture_scores_both_classes() {
        let predictor = tumour_predictor();
        assert_eq!(label_of(&predictor.predict(&benign_record()).unwrap()), Some(BENIGN));
        assert_eq!(label_of(&predictor.predict(&malignant_record()).unwrap()), Some(MALIGNANT));
    }

    #[test]
    fn tumour_transformer_yields_schema_columns() {
        let out = tumour_transformer().transform_record(&benign_record()).unwrap();
        let schema = tumour_schema();
        assert_eq!(out.len(), schema.n_features());
        assert!(schema.names().all(|name| out.contains_key(name)));
    }

    #[test]
    fn batch_is_deterministic() {
        assert_eq!(tumour_batch(25), tumour_batch(25));
        assert_eq!(tumour_batch(25).len(), 25);
    }
}
