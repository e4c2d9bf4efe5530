//! End-to-end predictor behaviour: schema enforcement, artifact resolution,
//! vocabulary mapping and construction failures.

use approx::assert_abs_diff_eq;
use ndarray::arr2;
use rstest::rstest;

use modelpack::artifact::{resolve, Artifact, ArtifactError};
use modelpack::model::{
    encode_model, Forest, LinearModel, ModelEncoding, ModelMeta, Prediction, TreeBuilder,
};
use modelpack::predictor::{LoadError, PredictError, Predictor, PredictorSpec};
use modelpack::schema::{FeatureSchema, OutputSpec, UNKNOWN_LABEL};
use modelpack::testing::{
    abc_artifacts, abc_predictor, abc_spec, benign_record, diagnosis_output, label_of,
    malignant_record, tumour_predictor, BENIGN, MALIGNANT, MODEL_ARTIFACT, OUTPUT_FIELD,
};
use modelpack::transform::TransformError;
use modelpack::value::{record, Record, Value};

// =============================================================================
// Scenario: classifier on [a, b, c]
// =============================================================================

#[test]
fn partial_record_is_filled_with_defaults() {
    let predictor = abc_predictor();
    let raw = record([("a", Value::from(5))]);

    let row = predictor.preprocess(&raw).unwrap();
    assert_eq!(row.values().to_vec(), vec![5.0, 0.0, 0.0]);
    assert_eq!(row.n_defaulted(), 2);
    assert_eq!(row.defaulted_columns().collect::<Vec<_>>(), vec!["b", "c"]);

    let first = predictor.predict(&raw).unwrap();
    let second = predictor.predict(&raw).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(label_of(&first), Some(MALIGNANT));
}

#[test]
fn empty_record_is_all_defaults() {
    let predictor = abc_predictor();
    let row = predictor.preprocess(&Record::new()).unwrap();
    assert_eq!(row.n_defaulted(), 3);
    assert_eq!(
        label_of(&predictor.predict(&Record::new()).unwrap()),
        Some(BENIGN)
    );
}

#[test]
fn extra_fields_are_ignored() {
    let predictor = abc_predictor();
    let plain = record([("a", Value::from(1.5)), ("b", Value::from(-2))]);
    let mut noisy = plain.clone();
    noisy.insert("patient_id".into(), Value::from("p-0042"));
    noisy.insert("z".into(), Value::from(1e9));

    assert_eq!(
        predictor.preprocess(&plain).unwrap().values(),
        predictor.preprocess(&noisy).unwrap().values()
    );
    assert_eq!(
        predictor.predict_raw(&plain).unwrap(),
        predictor.predict_raw(&noisy).unwrap()
    );
}

#[test]
fn null_counts_as_absent() {
    let predictor = abc_predictor();
    let row = predictor
        .preprocess(&record([("a", Value::Null), ("b", Value::from(1))]))
        .unwrap();
    assert_eq!(row.get("a"), Some(0.0));
    assert_eq!(row.get("b"), Some(1.0));
    assert_eq!(row.n_defaulted(), 2);
}

#[test]
fn booleans_coerce_to_numbers() {
    let predictor = abc_predictor();
    let row = predictor
        .preprocess(&record([("a", Value::Bool(true)), ("c", Value::Bool(false))]))
        .unwrap();
    assert_eq!(row.values().to_vec(), vec![1.0, 0.0, 0.0]);
}

#[test]
fn text_in_numeric_column_is_a_schema_violation() {
    let predictor = abc_predictor();
    let err = predictor
        .predict(&record([("b", Value::from("large"))]))
        .unwrap_err();
    assert_eq!(
        err,
        PredictError::SchemaViolation {
            column: "b".into(),
            value: Value::from("large"),
        }
    );
}

#[test]
fn raw_prediction_exposes_probabilities() {
    let predictor = abc_predictor();
    // margin = 5 - 2 = 3
    let prediction = predictor
        .predict_raw(&record([("a", Value::from(5))]))
        .unwrap();
    assert_eq!(prediction.class(), Some(1));
    assert_abs_diff_eq!(
        prediction.scores()[0],
        1.0 / (1.0 + (-3.0f64).exp()),
        epsilon = 1e-12
    );
}

// =============================================================================
// Artifact resolution and construction
// =============================================================================

#[test]
fn missing_artifact_lists_available_names() {
    let artifacts = abc_artifacts();
    let err = resolve(&artifacts, "missing.bin").unwrap_err();
    assert_eq!(
        err,
        ArtifactError::NotFound {
            name: "missing.bin".into(),
            available: vec![MODEL_ARTIFACT.into(), "README.txt".into()],
        }
    );
}

#[test]
fn predictor_fails_without_model_artifact() {
    let spec = PredictorSpec {
        model_artifact: "missing.bin".into(),
        ..abc_spec()
    };
    let err = Predictor::new(&abc_artifacts(), spec).unwrap_err();
    assert!(
        matches!(err, LoadError::Artifact(ArtifactError::NotFound { ref name, .. }) if name == "missing.bin"),
        "got: {err:?}"
    );
}

#[rstest]
#[case::empty(vec![])]
#[case::garbage(b"definitely not a model".to_vec())]
#[case::truncated_envelope(b"MPKM\x01\x00".to_vec())]
#[case::huge_class_count(
    br#"{"v1":{"meta":{"n_features":3,"task":{"MulticlassClassification":{"n_classes":4611686018427387904}}},"body":{"forest":{"trees":[]}}}}"#.to_vec()
)]
fn undecodable_model_is_a_deserialization_error(#[case] bytes: Vec<u8>) {
    let artifacts = vec![Artifact::new(MODEL_ARTIFACT, bytes)];
    let err = Predictor::new(&artifacts, abc_spec()).unwrap_err();
    assert!(
        matches!(err, LoadError::Deserialization { ref artifact, .. } if artifact == MODEL_ARTIFACT),
        "got: {err:?}"
    );
}

#[test]
fn schema_must_match_model_width() {
    let spec = PredictorSpec {
        schema: FeatureSchema::zeros(["a", "b"]).unwrap(),
        ..abc_spec()
    };
    let err = Predictor::new(&abc_artifacts(), spec).unwrap_err();
    assert!(matches!(
        err,
        LoadError::FeatureMismatch {
            model: 3,
            schema: 2
        }
    ));
}

#[test]
fn vocabulary_must_not_contain_the_sentinel() {
    let spec = PredictorSpec {
        output: OutputSpec::labels(OUTPUT_FIELD, [(0, BENIGN), (1, UNKNOWN_LABEL)]),
        ..abc_spec()
    };
    let err = Predictor::new(&abc_artifacts(), spec).unwrap_err();
    assert!(matches!(err, LoadError::InvalidPackage(_)), "got: {err:?}");
}

#[test]
fn classifier_needs_a_vocabulary() {
    let spec = PredictorSpec {
        output: OutputSpec::scalar(OUTPUT_FIELD),
        ..abc_spec()
    };
    let err = Predictor::new(&abc_artifacts(), spec).unwrap_err();
    assert!(matches!(err, LoadError::InvalidPackage(_)), "got: {err:?}");
}

// =============================================================================
// Vocabulary mapping
// =============================================================================

/// Multiclass forest over one feature `x` with class values `[0, 1, 7]`:
/// `x < 1` -> 0, `1 <= x < 2` -> 1, `x >= 2` -> 7.
fn banded_predictor() -> Predictor {
    let low = TreeBuilder::new()
        .split(0, 1.0, 1, 2, true)
        .leaf(5.0)
        .leaf(0.0)
        .build()
        .unwrap();
    let mid = TreeBuilder::new()
        .split(0, 1.0, 1, 2, true)
        .leaf(0.0)
        .split(0, 2.0, 3, 4, true)
        .leaf(5.0)
        .leaf(0.0)
        .build()
        .unwrap();
    let high = TreeBuilder::new()
        .split(0, 2.0, 1, 2, true)
        .leaf(0.0)
        .leaf(5.0)
        .build()
        .unwrap();

    let meta = ModelMeta::for_multiclass(1, 3).with_classes(vec![0, 1, 7]);
    let forest = Forest::from_parts(meta, vec![low, mid, high], vec![0, 1, 2], vec![0.0; 3]).unwrap();
    let bytes = encode_model(forest, ModelEncoding::Json).unwrap();

    let spec = PredictorSpec::builder()
        .model_artifact("forest.json")
        .schema(FeatureSchema::zeros(["x"]).unwrap())
        .output(diagnosis_output())
        .build();
    Predictor::new(&[Artifact::new("forest.json", bytes)], spec).unwrap()
}

#[rstest]
#[case(0.0, BENIGN)]
#[case(1.5, MALIGNANT)]
#[case(3.0, UNKNOWN_LABEL)]
fn class_values_map_through_the_vocabulary(#[case] x: f64, #[case] expected: &str) {
    let predictor = banded_predictor();
    let out = predictor.predict(&record([("x", Value::from(x))])).unwrap();
    assert_eq!(label_of(&out), Some(expected));
    assert_eq!(predictor.is_unknown(&out), expected == UNKNOWN_LABEL);
}

#[test]
fn postprocess_maps_class_values_directly() {
    let predictor = abc_predictor();
    let out = |class| {
        predictor.postprocess(&Prediction::Class {
            class,
            scores: vec![0.5],
        })
    };
    assert_eq!(label_of(&out(1)), Some(MALIGNANT));
    assert_eq!(label_of(&out(0)), Some(BENIGN));
    assert_eq!(label_of(&out(42)), Some(UNKNOWN_LABEL));
}

#[test]
fn custom_sentinel_is_used() {
    let spec = PredictorSpec {
        output: diagnosis_output().with_unknown_label("N/A"),
        ..abc_spec()
    };
    let predictor = Predictor::new(&abc_artifacts(), spec).unwrap();
    let out = predictor.postprocess(&Prediction::Class {
        class: -1,
        scores: vec![0.0],
    });
    assert_eq!(label_of(&out), Some("N/A"));
    assert!(predictor.is_unknown(&out));
}

#[test]
fn regressor_emits_raw_score() {
    let model = LinearModel::new(arr2(&[[2.0], [1.0]]), ModelMeta::for_regression(1)).unwrap();
    let bytes = encode_model(model, ModelEncoding::Binary).unwrap();
    let spec = PredictorSpec::builder()
        .model_artifact("reg.bin")
        .schema(FeatureSchema::from_pairs([("x", 0.5)]).unwrap())
        .output(OutputSpec::scalar("risk"))
        .build();
    let predictor = Predictor::new(&[Artifact::new("reg.bin", bytes)], spec).unwrap();

    assert_eq!(
        predictor.predict(&Record::new()).unwrap()["risk"],
        Value::Float(2.0)
    );
    assert_eq!(
        predictor.predict(&record([("x", Value::from(3))])).unwrap()["risk"],
        Value::Float(7.0)
    );
}

// =============================================================================
// Transformer in front of the schema
// =============================================================================

#[test]
fn packaged_transformer_runs_before_schema_enforcement() {
    let predictor = tumour_predictor();
    let row = predictor.preprocess(&malignant_record()).unwrap();

    assert_eq!(row.n_defaulted(), 0);
    assert_eq!(row.get("laterality"), Some(1.0));
    assert_eq!(row.get("poly_0"), Some(150.0));
    assert_abs_diff_eq!(row.get("poly_4").unwrap(), 150.0 * 24.0);
    assert_eq!(row.get("perimeter_worst"), None);

    assert_eq!(
        label_of(&predictor.predict(&malignant_record()).unwrap()),
        Some(MALIGNANT)
    );
    assert_eq!(
        label_of(&predictor.predict(&benign_record()).unwrap()),
        Some(BENIGN)
    );
}

#[test]
fn missing_transformer_source_is_a_transform_error() {
    let predictor = tumour_predictor();
    let mut raw = benign_record();
    raw.remove("radius_worst");
    assert_eq!(
        predictor.predict(&raw).unwrap_err(),
        PredictError::Transform(TransformError::MissingColumn {
            column: "radius_worst".into()
        })
    );
}

#[test]
fn unknown_category_is_a_transform_error() {
    let predictor = tumour_predictor();
    let mut raw = benign_record();
    raw.insert("laterality".into(), Value::from("bilateral"));
    assert!(matches!(
        predictor.predict(&raw),
        Err(PredictError::Transform(TransformError::UnknownCategory { .. }))
    ));
}

#[test]
fn missing_model_column_after_transform_uses_its_default() {
    let predictor = tumour_predictor();
    let mut raw = benign_record();
    raw.remove("texture_mean");
    let row = predictor.preprocess(&raw).unwrap();
    assert_eq!(row.defaulted_columns().collect::<Vec<_>>(), vec!["texture_mean"]);
    assert_eq!(row.get("texture_mean"), Some(19.3));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn shared_predictor_serves_many_threads() {
    let predictor = tumour_predictor();
    let expected = predictor.predict(&malignant_record()).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    assert_eq!(predictor.predict(&malignant_record()).unwrap(), expected);
                }
            });
        }
    });
}
