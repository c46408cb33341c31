//! Local filesystem blob store
//!
//! Stores claim photos under a root directory using the storage path as a
//! relative key. Keys that would escape the root are refused.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use core_kernel::{DomainPort, PortError};
use domain_claims::ports::ImageBlobStore;

use crate::error::DatabaseError;

/// Image bytes on the local disk
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key below the root
    fn resolve(&self, key: &str) -> Result<PathBuf, PortError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PortError::validation(format!("invalid storage path '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

impl DomainPort for LocalBlobStore {}

#[async_trait]
impl ImageBlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PortError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DatabaseError::from)?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(DatabaseError::from)?;
        debug!(path = %path, bytes = bytes.len(), "Stored image blob");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::not_found("Blob", path))
            }
            Err(e) => Err(DatabaseError::from(e).into()),
        }
    }

    /// Removing a missing blob succeeds
    async fn delete(&self, path: &str) -> Result<(), PortError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DatabaseError::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let key = "0190a1b2/front_20240101120000_0_abcd1234.png";

        store.put(key, b"png-bytes").await.unwrap();
        assert!(dir.path().join(key).exists());
        assert_eq!(store.get(key).await.unwrap(), b"png-bytes");

        store.delete(key).await.unwrap();
        assert!(store.get(key).await.unwrap_err().is_not_found());
        store.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for key in ["../outside.png", "/etc/passwd", "a/../../b.png", ""] {
            let err = store.put(key, b"x").await.unwrap_err();
            assert!(matches!(err, PortError::Validation { .. }), "key {:?}", key);
        }
    }
}
