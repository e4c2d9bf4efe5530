//! Package container on disk: round trips and rejection of damaged files.

use modelpack::artifact::{Artifact, ArtifactError};
use modelpack::package::format::{FormatError, FORMAT_VERSION_MAJOR, HEADER_SIZE};
use modelpack::package::{ModelPackage, PackageManifest, PACKAGE_MAGIC};
use modelpack::predictor::{LoadError, Predictor};
use modelpack::testing::{
    benign_record, label_of, malignant_record, tumour_package, tumour_spec, BENIGN, MALIGNANT,
    MODEL_ARTIFACT,
};
use modelpack::Error;

fn saved_package() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tumour.mpkg");
    tumour_package().save(&path).unwrap();
    (dir, path)
}

#[test]
fn save_then_load_preserves_everything() {
    let original = tumour_package();
    let (_dir, path) = saved_package();

    let loaded = ModelPackage::load(&path).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.name(), "breast-cancer-logistic");
    assert_eq!(
        loaded.manifest().attributes.get("algorithm").map(String::as_str),
        Some("logistic_regression")
    );
    assert_eq!(
        loaded.artifact(MODEL_ARTIFACT).unwrap().bytes(),
        original.artifact(MODEL_ARTIFACT).unwrap().bytes()
    );
    assert_eq!(loaded.manifest().predictor, tumour_spec());
}

#[test]
fn loaded_package_predicts_like_the_original() {
    let (_dir, path) = saved_package();
    let predictor = Predictor::from_package(&ModelPackage::load(&path).unwrap()).unwrap();
    assert_eq!(label_of(&predictor.predict(&benign_record()).unwrap()), Some(BENIGN));
    assert_eq!(
        label_of(&predictor.predict(&malignant_record()).unwrap()),
        Some(MALIGNANT)
    );
}

#[test]
fn predictor_loads_straight_from_a_file() {
    let (_dir, path) = saved_package();
    let predictor = Predictor::load(&path).unwrap();
    assert_eq!(
        label_of(&predictor.predict(&malignant_record()).unwrap()),
        Some(MALIGNANT)
    );
}

#[test]
fn corrupt_model_in_a_package_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.mpkg");
    let bad_model = br#"{"v1":{"meta":{"n_features":12,"task":{"MulticlassClassification":{"n_classes":4611686018427387904}}},"body":{"forest":{"trees":[]}}}}"#;
    let package = ModelPackage::new(
        PackageManifest::new("corrupt", tumour_spec()),
        vec![Artifact::new(MODEL_ARTIFACT, bad_model.to_vec())],
    )
    .unwrap();
    package.save(&path).unwrap();

    let err = Predictor::load(&path).unwrap_err();
    assert!(
        matches!(err, Error::Load(LoadError::Deserialization { ref artifact, .. }) if artifact == MODEL_ARTIFACT),
        "got: {err:?}"
    );
    assert!(matches!(
        Predictor::load(dir.path().join("absent.mpkg")).unwrap_err(),
        Error::Io(_)
    ));
}

#[test]
fn json_file_loads_too() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tumour.json");
    let original = tumour_package();
    std::fs::write(&path, original.to_json().unwrap()).unwrap();
    assert_eq!(ModelPackage::load(&path).unwrap(), original);
}

#[test]
fn header_layout() {
    let bytes = tumour_package().to_bytes().unwrap();
    assert_eq!(&bytes[0..4], PACKAGE_MAGIC);
    assert_eq!(bytes[4], FORMAT_VERSION_MAJOR);
    // one artifact
    assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 1);
    let size = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + size);
}

#[test]
fn corrupt_payload_fails_checksum() {
    let (_dir, path) = saved_package();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = ModelPackage::load(&path).unwrap_err();
    assert!(
        matches!(err, Error::Format(FormatError::ChecksumMismatch { .. })),
        "got: {err:?}"
    );
}

#[test]
fn wrong_magic_is_rejected() {
    let mut bytes = tumour_package().to_bytes().unwrap();
    bytes[..4].copy_from_slice(b"ZIP!");
    let err = ModelPackage::from_bytes(&bytes).unwrap_err();
    assert!(
        matches!(err, Error::Format(FormatError::BadMagic { ref found, .. }) if found == "ZIP!"),
        "got: {err:?}"
    );
}

#[test]
fn newer_major_version_is_rejected() {
    let mut bytes = tumour_package().to_bytes().unwrap();
    bytes[4] = FORMAT_VERSION_MAJOR + 1;
    let err = ModelPackage::from_bytes(&bytes).unwrap_err();
    assert!(
        matches!(err, Error::Format(FormatError::UnsupportedVersion { major, .. }) if major == FORMAT_VERSION_MAJOR + 1),
        "got: {err:?}"
    );
}

#[test]
fn newer_minor_version_is_accepted() {
    let mut bytes = tumour_package().to_bytes().unwrap();
    bytes[5] = 9;
    assert!(ModelPackage::from_bytes(&bytes).is_ok());
}

#[test]
fn truncated_file_is_rejected() {
    let bytes = tumour_package().to_bytes().unwrap();
    for cut in [3, HEADER_SIZE - 1, HEADER_SIZE + 5, bytes.len() - 1] {
        let err = ModelPackage::from_bytes(&bytes[..cut]).unwrap_err();
        assert!(matches!(err, Error::Format(_)), "cut {cut}: {err:?}");
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelPackage::load(dir.path().join("absent.mpkg")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn package_without_its_model_is_rejected() {
    let manifest = PackageManifest::new("broken", tumour_spec());
    let err = ModelPackage::new(manifest, vec![Artifact::new("other.bin", vec![1, 2, 3])]).unwrap_err();
    assert!(matches!(
        err,
        Error::Artifact(ArtifactError::NotFound { ref available, .. }) if available == &["other.bin".to_string()]
    ));
}

#[test]
fn artifact_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.bin");
    std::fs::write(&path, [1u8, 2, 3]).unwrap();
    let artifact = Artifact::from_file("weights.bin", &path).unwrap();
    assert_eq!(artifact.name(), "weights.bin");
    assert_eq!(artifact.bytes(), &[1, 2, 3]);
}

#[cfg(feature = "compression")]
#[test]
fn large_packages_are_compressed() {
    use modelpack::package::format::{EnvelopeCodec, FormatFlags};

    let base = tumour_package();
    let mut artifacts = base.store().clone().into_vec();
    artifacts.push(Artifact::new("padding.bin", vec![7u8; 256 * 1024]));
    let big = ModelPackage::new(base.manifest().clone(), artifacts).unwrap();

    let packed = big.to_bytes().unwrap();
    let flags = u16::from_le_bytes([packed[6], packed[7]]);
    assert_ne!(flags & FormatFlags::COMPRESSED, 0);
    assert!(packed.len() < 64 * 1024);
    assert_eq!(ModelPackage::from_bytes(&packed).unwrap(), big);

    let plain = big.to_bytes_with(&EnvelopeCodec::without_compression()).unwrap();
    assert!(plain.len() > 256 * 1024);
    assert_eq!(ModelPackage::from_bytes(&plain).unwrap(), big);
}
