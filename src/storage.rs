//! Object storage collaborator used to stage datasets and keep model artifacts

use crate::error::ExternalError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const SERVICE: &str = "object-storage";

/// Minimal object storage contract
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file, returning its remote URI
    async fn upload(&self, local_path: &Path) -> Result<String, ExternalError>;

    /// Read the object behind a URI
    async fn read(&self, uri: &str) -> Result<Vec<u8>, ExternalError>;
}

/// Directory-backed storage with `file://` URIs
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, uri: &str) -> Result<PathBuf, ExternalError> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| ExternalError::fatal(SERVICE, format!("unsupported URI '{}'", uri)))?;
        let path = PathBuf::from(path);
        if !path.starts_with(&self.root) {
            return Err(ExternalError::fatal(
                SERVICE,
                format!("'{}' is outside the storage root", uri),
            ));
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, local_path: &Path) -> Result<String, ExternalError> {
        let file_name = local_path.file_name().ok_or_else(|| {
            ExternalError::fatal(SERVICE, format!("'{}' has no file name", local_path.display()))
        })?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ExternalError::retryable(SERVICE, e.to_string()))?;

        let target = self.root.join(file_name);
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExternalError::fatal(SERVICE, format!("{}: {}", local_path.display(), e))
            } else {
                ExternalError::retryable(SERVICE, e.to_string())
            }
        })?;

        let uri = format!("file://{}", target.display());
        debug!(local = %local_path.display(), uri = %uri, "Uploaded object");
        Ok(uri)
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>, ExternalError> {
        let path = self.path_for(uri)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExternalError::fatal(SERVICE, format!("{} not found", uri))
            } else {
                ExternalError::retryable(SERVICE, e.to_string())
            }
        })
    }
}

/// In-process storage, mainly for tests and single-node deployments
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes directly under a URI
    pub fn put(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, local_path: &Path) -> Result<String, ExternalError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| ExternalError::fatal(SERVICE, format!("{}: {}", local_path.display(), e)))?;
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let uri = format!("mem://{}", name);
        self.put(uri.clone(), bytes);
        Ok(uri)
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>, ExternalError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .ok_or_else(|| ExternalError::fatal(SERVICE, format!("{} not found", uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_upload_and_read() {
        let source_dir = tempfile::tempdir().unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let local = source_dir.path().join("dataset.json");
        std::fs::write(&local, b"{\"rows\":[]}").unwrap();

        let storage = LocalObjectStorage::new(storage_dir.path());
        let uri = storage.upload(&local).await.unwrap();
        assert!(uri.starts_with("file://"));
        assert_eq!(storage.read(&uri).await.unwrap(), b"{\"rows\":[]}".to_vec());
    }

    #[tokio::test]
    async fn test_local_rejects_foreign_uri() {
        let storage_dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(storage_dir.path());

        let err = storage.read("s3://bucket/key").await.unwrap_err();
        assert!(!err.is_retryable());
        let err = storage.read("file:///etc/hostname").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_upload_is_fatal() {
        let storage_dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(storage_dir.path());
        let err = storage
            .upload(Path::new("/nonexistent/dataset.json"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let storage = InMemoryObjectStorage::new();
        storage.put("mem://model", b"abc".to_vec());
        assert_eq!(storage.read("mem://model").await.unwrap(), b"abc".to_vec());
        assert!(storage.read("mem://other").await.is_err());
    }
}
