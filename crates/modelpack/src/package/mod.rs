//! Model package container.
//!
//! A [`ModelPackage`] bundles the artifacts exported at training time with
//! the manifest describing how to serve them: the predictor contract
//! (model artifact name, feature schema, output vocabulary, transformer)
//! plus free-form attributes.
//!
//! On disk a package is an `MPKG` envelope (see [`format`]) around a
//! postcard payload. The manifest is carried inside the payload as JSON
//! text, since its transformer steps use a self-describing serde layout.
//! A plain JSON form is also accepted, for hand-written fixtures.

pub mod format;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use format::{EnvelopeCodec, FormatError, FormatFlags, Header, HEADER_SIZE};

use crate::artifact::{Artifact, ArtifactError, ArtifactKind, ArtifactStore};
use crate::error::Result;
use crate::predictor::PredictorSpec;

/// Magic bytes of a package file.
pub const PACKAGE_MAGIC: &[u8; 4] = b"MPKG";

/// Serving metadata of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Human-readable package name.
    pub name: String,

    /// Contract the predictor is built from.
    pub predictor: PredictorSpec,

    /// Free-form key/value metadata (training date, dataset, metrics, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn new(name: impl Into<String>, predictor: PredictorSpec) -> Self {
        Self {
            name: name.into(),
            predictor,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Version-tagged payload. New layouts add variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum PackagePayload {
    V1(PackagePayloadV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackagePayloadV1 {
    manifest_json: String,
    artifacts: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactRecord {
    name: String,
    kind: ArtifactKind,
    bytes: Vec<u8>,
}

/// JSON package layout. Artifacts carry either UTF-8 `text` or raw `bytes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackageJson {
    manifest: PackageManifest,
    artifacts: Vec<ArtifactJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactJson {
    name: String,
    #[serde(default)]
    kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes: Option<Vec<u8>>,
}

// ============================================================================
// ModelPackage
// ============================================================================

/// Artifacts plus manifest. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPackage {
    manifest: PackageManifest,
    store: ArtifactStore,
}

impl ModelPackage {
    /// Bundle artifacts under a manifest.
    ///
    /// # Errors
    ///
    /// - duplicate artifact names
    /// - the model artifact named by the manifest is missing
    /// - an invalid output spec
    pub fn new(manifest: PackageManifest, artifacts: Vec<Artifact>) -> Result<Self> {
        let store = ArtifactStore::new(artifacts)?;
        store.resolve(&manifest.predictor.model_artifact)?;
        manifest.predictor.output.validate()?;
        Ok(Self { manifest, store })
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Resolve one artifact by name.
    pub fn artifact(&self, name: &str) -> std::result::Result<&Artifact, ArtifactError> {
        self.store.resolve(name)
    }

    // ------------------------------------------------------------------------
    // Binary
    // ------------------------------------------------------------------------

    /// Encode with the default codec.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, FormatError> {
        self.to_bytes_with(&EnvelopeCodec::new())
    }

    /// Encode with an explicit codec (e.g. to control compression).
    pub fn to_bytes_with(&self, codec: &EnvelopeCodec) -> std::result::Result<Vec<u8>, FormatError> {
        let payload = PackagePayload::V1(PackagePayloadV1 {
            manifest_json: serde_json::to_string(&self.manifest)?,
            artifacts: self
                .store
                .iter()
                .map(|a| ArtifactRecord {
                    name: a.name().to_string(),
                    kind: a.kind(),
                    bytes: a.bytes().to_vec(),
                })
                .collect(),
        });
        let count = u32::try_from(self.store.len())
            .map_err(|_| FormatError::Corrupt("too many artifacts".into()))?;
        codec.encode(*PACKAGE_MAGIC, count, &payload)
    }

    /// Decode a package, detecting binary or JSON layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if format::has_magic(bytes, PACKAGE_MAGIC) {
            Self::from_binary(bytes)
        } else if format::looks_like_json(bytes) {
            Self::from_json_slice(bytes)
        } else {
            Err(FormatError::BadMagic {
                expected: String::from_utf8_lossy(PACKAGE_MAGIC).into_owned(),
                found: String::from_utf8_lossy(&bytes[..bytes.len().min(4)]).into_owned(),
            }
            .into())
        }
    }

    fn from_binary(bytes: &[u8]) -> Result<Self> {
        let (header, payload) =
            EnvelopeCodec::new().decode::<PackagePayload>(bytes, PACKAGE_MAGIC)?;
        let PackagePayload::V1(v1) = payload;
        if header.count as usize != v1.artifacts.len() {
            return Err(FormatError::Corrupt(format!(
                "header declares {} artifacts, payload holds {}",
                header.count,
                v1.artifacts.len()
            ))
            .into());
        }
        let manifest: PackageManifest =
            serde_json::from_str(&v1.manifest_json).map_err(FormatError::from)?;
        let artifacts = v1
            .artifacts
            .into_iter()
            .map(|r| Artifact::new(r.name, r.bytes).with_kind(r.kind))
            .collect();
        Self::new(manifest, artifacts)
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    /// Pretty JSON form. UTF-8 artifacts are written as text.
    pub fn to_json(&self) -> std::result::Result<String, FormatError> {
        let doc = PackageJson {
            manifest: self.manifest.clone(),
            artifacts: self
                .store
                .iter()
                .map(|a| {
                    let (text, bytes) = match std::str::from_utf8(a.bytes()) {
                        Ok(s) => (Some(s.to_string()), None),
                        Err(_) => (None, Some(a.bytes().to_vec())),
                    };
                    ArtifactJson {
                        name: a.name().to_string(),
                        kind: a.kind(),
                        text,
                        bytes,
                    }
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let doc: PackageJson = serde_json::from_slice(bytes).map_err(FormatError::from)?;
        let artifacts = doc
            .artifacts
            .into_iter()
            .map(|a| {
                let bytes = match (a.text, a.bytes) {
                    (Some(text), None) => text.into_bytes(),
                    (None, Some(bytes)) => bytes,
                    _ => {
                        return Err(FormatError::Corrupt(format!(
                            "artifact {:?} needs exactly one of `text` or `bytes`",
                            a.name
                        )))
                    }
                };
                Ok(Artifact::new(a.name, bytes).with_kind(a.kind))
            })
            .collect::<std::result::Result<Vec<_>, FormatError>>()?;
        Self::new(doc.manifest, artifacts)
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Write the binary form to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        tracing::debug!(
            package = %self.manifest.name,
            path = %path.display(),
            n_artifacts = self.store.len(),
            n_bytes = bytes.len(),
            "package saved"
        );
        Ok(())
    }

    /// Read a package file (binary or JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = {
            let mut reader = BufReader::new(File::open(path)?);
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            bytes
        };
        let package = Self::from_bytes(&bytes)?;
        tracing::debug!(
            package = %package.manifest.name,
            path = %path.display(),
            n_artifacts = package.store.len(),
            "package loaded"
        );
        Ok(package)
    }
}
