//! Named binary artifacts and lookup.
//!
//! An [`Artifact`] is an immutable blob produced at export time (serialized
//! model weights, fitted transformers). A model package owns an ordered list
//! of them; consumers resolve one by exact name and deserialize it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What an artifact holds. Informational only; lookup is by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A serialized inference model.
    Model,
    /// A fitted preprocessing object.
    Transformer,
    #[default]
    Other,
}

/// Immutable named payload.
///
/// The bytes are reference counted so cloning an artifact (or a package that
/// holds it) never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    kind: ArtifactKind,
    bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind: ArtifactKind::Other,
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Tag the artifact with a kind.
    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = kind;
        self
    }

    /// Read an artifact from a file on disk.
    ///
    /// The file handle is dropped before returning, on success and on error.
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(name, bytes))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Errors raised while resolving artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// No artifact carries the requested name.
    #[error("artifact {name:?} not found (available: {available:?})")]
    NotFound { name: String, available: Vec<String> },

    /// Two artifacts share a name inside one package.
    #[error("duplicate artifact name {0:?}")]
    Duplicate(String),
}

/// Find the artifact called `name`.
///
/// Linear scan with exact, case-sensitive matching. On failure the error
/// lists every available name in package order.
pub fn resolve<'a>(artifacts: &'a [Artifact], name: &str) -> Result<&'a Artifact, ArtifactError> {
    artifacts
        .iter()
        .find(|a| a.name == name)
        .ok_or_else(|| ArtifactError::NotFound {
            name: name.to_string(),
            available: artifacts.iter().map(|a| a.name.clone()).collect(),
        })
}

/// Indexed, ordered artifact collection with unique names.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
}

impl ArtifactStore {
    /// Build a store, rejecting duplicate names.
    pub fn new(artifacts: Vec<Artifact>) -> Result<Self, ArtifactError> {
        let mut index = HashMap::with_capacity(artifacts.len());
        for (i, artifact) in artifacts.iter().enumerate() {
            if index.insert(artifact.name.clone(), i).is_some() {
                return Err(ArtifactError::Duplicate(artifact.name.clone()));
            }
        }
        Ok(Self { artifacts, index })
    }

    /// Look up an artifact by exact name.
    pub fn resolve(&self, name: &str) -> Result<&Artifact, ArtifactError> {
        self.get(name).ok_or_else(|| ArtifactError::NotFound {
            name: name.to_string(),
            available: self.names().map(str::to_string).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.index.get(name).map(|&i| &self.artifacts[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Artifact names in package order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(|a| a.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn as_slice(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn into_vec(self) -> Vec<Artifact> {
        self.artifacts
    }
}

impl PartialEq for ArtifactStore {
    fn eq(&self, other: &Self) -> bool {
        self.artifacts == other.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Artifact> {
        vec![
            Artifact::new("model.bin", vec![1, 2, 3]).with_kind(ArtifactKind::Model),
            Artifact::new("scaler.bin", vec![4]).with_kind(ArtifactKind::Transformer),
        ]
    }

    #[test]
    fn resolve_exact_match() {
        let artifacts = sample();
        let found = resolve(&artifacts, "scaler.bin").unwrap();
        assert_eq!(found.bytes(), &[4]);
        assert_eq!(found.kind(), ArtifactKind::Transformer);
    }

    #[test]
    fn resolve_missing_lists_available() {
        let artifacts = sample();
        let err = resolve(&artifacts, "missing.bin").unwrap_err();
        assert_eq!(
            err,
            ArtifactError::NotFound {
                name: "missing.bin".into(),
                available: vec!["model.bin".into(), "scaler.bin".into()],
            }
        );
        assert!(err.to_string().contains("scaler.bin"));
    }

    #[test]
    fn resolve_is_case_sensitive() {
        let artifacts = sample();
        assert!(resolve(&artifacts, "MODEL.bin").is_err());
    }

    #[test]
    fn store_rejects_duplicates() {
        let mut artifacts = sample();
        artifacts.push(Artifact::new("model.bin", vec![9]));
        assert_eq!(
            ArtifactStore::new(artifacts).unwrap_err(),
            ArtifactError::Duplicate("model.bin".into())
        );
    }

    #[test]
    fn store_preserves_order() {
        let store = ArtifactStore::new(sample()).unwrap();
        assert_eq!(store.names().collect::<Vec<_>>(), ["model.bin", "scaler.bin"]);
        assert!(store.contains("model.bin"));
        assert!(store.resolve("nope").is_err());
    }

    #[test]
    fn clone_shares_bytes() {
        let a = Artifact::new("x", vec![0u8; 1024]);
        let b = a.clone();
        assert_eq!(a.bytes().as_ptr(), b.bytes().as_ptr());
    }
}
