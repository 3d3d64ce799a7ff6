// SPDX-License-Identifier: Apache-2.0

//! Object-store emission of CDN artifacts. Backends are blocking; callers
//! on an async runtime wrap them in `spawn_blocking` alongside the storage
//! transaction they run inside of.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quiver_registry_model::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArtifactKind {
    Sdl,
    Services,
    Supergraph,
    Metadata,
}

impl ArtifactKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sdl => "sdl",
            Self::Services => "services",
            Self::Supergraph => "supergraph",
            Self::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub target_id: TargetId,
    pub contract_name: Option<String>,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    #[must_use]
    pub fn target(target_id: TargetId, kind: ArtifactKind) -> Self {
        Self {
            target_id,
            contract_name: None,
            kind,
        }
    }

    #[must_use]
    pub fn contract(target_id: TargetId, contract_name: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            target_id,
            contract_name: Some(contract_name.into()),
            kind,
        }
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        match &self.contract_name {
            Some(contract) => format!(
                "artifact/{}/contracts/{}/{}",
                self.target_id,
                contract,
                self.kind.as_str()
            ),
            None => format!("artifact/{}/{}", self.target_id, self.kind.as_str()),
        }
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStoreError(pub String);

impl Display for ArtifactStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "artifact store error: {}", self.0)
    }
}

impl std::error::Error for ArtifactStoreError {}

pub trait ArtifactStoreBackend: Send + Sync {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), ArtifactStoreError>;
    fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, ArtifactStoreError>;
    fn delete(&self, key: &ArtifactKey) -> Result<(), ArtifactStoreError>;
}

/// Filesystem backend. Writes go to a temp file first and move into place,
/// so readers never observe a torn artifact.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.storage_key())
    }
}

fn write_atomic_file(path: &Path, bytes: &[u8]) -> Result<(), ArtifactStoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| ArtifactStoreError("artifact path has no parent".to_string()))?;
    fs::create_dir_all(parent).map_err(|e| ArtifactStoreError(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(|e| ArtifactStoreError(e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| ArtifactStoreError(e.to_string()))?;
        file.sync_all().map_err(|e| ArtifactStoreError(e.to_string()))?;
    }
    fs::rename(&tmp, path).map_err(|e| ArtifactStoreError(e.to_string()))
}

impl ArtifactStoreBackend for LocalArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), ArtifactStoreError> {
        write_atomic_file(&self.path_for(key), bytes)
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactStoreError(e.to_string())),
        }
    }

    fn delete(&self, key: &ArtifactKey) -> Result<(), ArtifactStoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactStoreError(e.to_string())),
        }
    }
}

/// In-memory backend for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ArtifactStoreBackend for MemoryArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), ArtifactStoreError> {
        self.entries
            .lock()
            .map_err(|_| ArtifactStoreError("poisoned artifact store".to_string()))?
            .insert(key.storage_key(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| ArtifactStoreError("poisoned artifact store".to_string()))?
            .get(&key.storage_key())
            .cloned())
    }

    fn delete(&self, key: &ArtifactKey) -> Result<(), ArtifactStoreError> {
        self.entries
            .lock()
            .map_err(|_| ArtifactStoreError("poisoned artifact store".to_string()))?
            .remove(&key.storage_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_the_cdn_contract() {
        let target = TargetId::new("staging").expect("target id");
        assert_eq!(
            ArtifactKey::target(target.clone(), ArtifactKind::Sdl).storage_key(),
            "artifact/staging/sdl"
        );
        assert_eq!(
            ArtifactKey::contract(target, "public", ArtifactKind::Supergraph).storage_key(),
            "artifact/staging/contracts/public/supergraph"
        );
    }

    #[test]
    fn local_store_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalArtifactStore::new(dir.path());
        let key = ArtifactKey::target(
            TargetId::new("staging").expect("target id"),
            ArtifactKind::Services,
        );
        assert_eq!(store.get(&key).expect("get"), None);
        store.put(&key, b"[]").expect("put");
        assert_eq!(store.get(&key).expect("get"), Some(b"[]".to_vec()));
        store.delete(&key).expect("delete");
        assert_eq!(store.get(&key).expect("get"), None);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryArtifactStore::new();
        let key = ArtifactKey::target(
            TargetId::new("staging").expect("target id"),
            ArtifactKind::Sdl,
        );
        store.put(&key, b"type Query { ok: Boolean }").expect("put");
        assert!(store.get(&key).expect("get").is_some());
        assert_eq!(store.keys(), vec!["artifact/staging/sdl".to_string()]);
    }
}
