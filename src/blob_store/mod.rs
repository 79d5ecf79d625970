/// Blob Storage System
///
/// Holds the bytes behind every asset. The lifecycle code only sees the
/// `BlobBackend` trait; which backend is used is decided once, from configuration.

pub mod disk;
pub mod s3;
pub mod signing;

pub use disk::DiskBlobBackend;
pub use s3::{S3BlobBackend, S3Config};
pub use signing::UploadSigner;

use crate::assets::UploadDescriptor;
use crate::config::{BlobstoreConfig, ServerConfig};
use crate::error::StockroomResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Parameters for a signed upload URL
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    pub key: &'a str,
    pub content_type: &'a str,
    /// Largest body the signature allows
    pub max_bytes: i64,
    /// Exact body length to bind, when the size is known up front
    pub content_length: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

/// Blob storage backend trait
///
/// Implementations handle the actual storage and retrieval of object bytes.
/// Keys are opaque `/`-separated strings produced by the asset layer.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store an object
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StockroomResult<()>;

    /// Retrieve an object
    async fn get(&self, key: &str) -> StockroomResult<Option<Vec<u8>>>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, key: &str) -> StockroomResult<()>;

    /// Size of an object in bytes, `None` when absent
    async fn size(&self, key: &str) -> StockroomResult<Option<u64>>;

    /// Issue a time-limited URL the client can PUT the bytes to
    async fn signed_upload_url(&self, target: UploadTarget<'_>) -> StockroomResult<UploadDescriptor>;

    /// Direct public URL for an object, when the backend serves objects itself
    fn public_url(&self, _key: &str) -> Option<String> {
        None
    }

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

/// Build the backend selected by configuration
pub async fn connect(config: &ServerConfig) -> StockroomResult<Arc<dyn BlobBackend>> {
    let backend: Arc<dyn BlobBackend> = match &config.storage.blobstore {
        BlobstoreConfig::Disk { location } => {
            let signer = UploadSigner::new(
                config.uploads.signing_secret.clone(),
                config.service.public_url.clone(),
            );
            Arc::new(DiskBlobBackend::new(location.clone(), signer))
        }
        BlobstoreConfig::S3 {
            bucket,
            region,
            access_key_id,
            secret_access_key,
            endpoint,
            public_base_url,
        } => Arc::new(
            S3BlobBackend::new(S3Config {
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                public_base_url: public_base_url.clone(),
            })
            .await?,
        ),
    };

    tracing::info!(backend = backend.name(), "Blob storage ready");
    Ok(backend)
}
