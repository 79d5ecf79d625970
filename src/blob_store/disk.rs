/// Disk-based blob storage backend
use crate::{
    assets::UploadDescriptor,
    blob_store::{BlobBackend, UploadSigner, UploadTarget},
    error::{StockroomError, StockroomResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Disk storage backend
///
/// Stores objects on the local filesystem, one file per key, mirroring the
/// key's `/` segments as directories. Uploads go through this service's own
/// signed PUT endpoint.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
    signer: UploadSigner,
}

impl DiskBlobBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf, signer: UploadSigner) -> Self {
        Self { base_path, signer }
    }

    /// Map a key onto a path below the base directory
    ///
    /// Only plain segments are accepted, so a key can never escape `base_path`.
    fn object_path(&self, key: &str) -> StockroomResult<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !plain {
            return Err(StockroomError::BlobStorage(format!(
                "Invalid object key: {}",
                key
            )));
        }

        Ok(self.base_path.join(relative))
    }

    /// Ensure the directory for an object exists
    async fn ensure_object_dir(&self, key: &str) -> StockroomResult<PathBuf> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StockroomError::BlobStorage(format!("Failed to create blob directory: {}", e))
            })?;
        }
        Ok(path)
    }

    /// Remove now-empty directories between the object and the base path
    async fn prune_empty_dirs(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || !dir.starts_with(&self.base_path) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StockroomResult<()> {
        let path = self.ensure_object_dir(key).await?;

        fs::write(&path, data).await.map_err(|e| {
            StockroomError::BlobStorage(format!("Failed to write blob {}: {}", key, e))
        })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StockroomResult<Option<Vec<u8>>> {
        let path = self.object_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StockroomError::BlobStorage(format!(
                "Failed to read blob {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> StockroomResult<()> {
        let path = self.object_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_dirs(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StockroomError::BlobStorage(format!(
                "Failed to delete blob {}: {}",
                key, e
            ))),
        }
    }

    async fn size(&self, key: &str) -> StockroomResult<Option<u64>> {
        let path = self.object_path(key)?;

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StockroomError::BlobStorage(format!(
                "Failed to get blob size {}: {}",
                key, e
            ))),
        }
    }

    async fn signed_upload_url(&self, target: UploadTarget<'_>) -> StockroomResult<UploadDescriptor> {
        // Reject bad keys at issue time rather than at upload time
        self.object_path(target.key)?;

        let url = self.signer.signed_url(
            target.key,
            target.content_type,
            target.max_bytes,
            target.expires_at,
        )?;

        Ok(UploadDescriptor {
            method: "PUT".to_string(),
            url,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                target.content_type.to_string(),
            )]),
        })
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn backend(dir: &Path) -> DiskBlobBackend {
        DiskBlobBackend::new(
            dir.to_path_buf(),
            UploadSigner::new(
                "a-test-secret-that-is-long-enough-to-use".to_string(),
                "http://localhost:8080".to_string(),
            ),
        )
    }

    #[tokio::test]
    async fn test_put_and_get_object() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        let key = "business/biz_1/assets/ast_1/logo.png";
        let data = b"test blob data".to_vec();

        backend.put(key, data.clone(), "image/png").await.unwrap();

        let retrieved = backend.get(key).await.unwrap();
        assert_eq!(retrieved, Some(data));
        assert!(dir.path().join(key).exists());
    }

    #[tokio::test]
    async fn test_get_nonexistent_object() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        let result = backend.get("business/b/assets/missing/x.png").await.unwrap();
        assert_eq!(result, None);
        assert_eq!(backend.size("business/b/assets/missing/x.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_object_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        let key = "business/biz_1/assets/ast_2/doc.pdf";
        backend.put(key, b"to be deleted".to_vec(), "application/pdf").await.unwrap();

        backend.delete(key).await.unwrap();
        assert_eq!(backend.get(key).await.unwrap(), None);
        // Empty per-asset directory is pruned, the base stays
        assert!(!dir.path().join("business/biz_1/assets/ast_2").exists());
        assert!(dir.path().exists());

        backend.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_object_size() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        let key = "business/biz_1/assets/ast_3/a.txt";
        backend.put(key, b"12345".to_vec(), "text/plain").await.unwrap();

        assert_eq!(backend.size(key).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        assert!(backend.put("../outside", vec![1], "text/plain").await.is_err());
        assert!(backend.get("/etc/passwd").await.is_err());
        assert!(backend.size("").await.is_err());
    }

    #[tokio::test]
    async fn test_signed_upload_url() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path());

        let descriptor = backend
            .signed_upload_url(UploadTarget {
                key: "business/b/assets/a/logo.png",
                content_type: "image/png",
                max_bytes: 12,
                content_length: Some(12),
                expires_at: Utc::now() + Duration::minutes(15),
            })
            .await
            .unwrap();

        assert_eq!(descriptor.method, "PUT");
        assert!(descriptor
            .url
            .starts_with("http://localhost:8080/v1/uploads/business/b/assets/a/logo.png?"));
        assert_eq!(
            descriptor.headers.get("Content-Type").map(String::as_str),
            Some("image/png")
        );
    }
}
