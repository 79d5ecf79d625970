/// S3-compatible blob storage backend
use crate::assets::UploadDescriptor;
use crate::blob_store::{BlobBackend, UploadTarget};
use crate::error::{StockroomError, StockroomResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// S3 blob storage backend
///
/// Supports AWS S3 and S3-compatible storage providers (MinIO, R2, DigitalOcean Spaces, etc.)
#[derive(Clone)]
pub struct S3BlobBackend {
    client: Arc<Client>,
    bucket: String,
    public_base_url: Option<String>,
}

/// Configuration for S3 storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-east-1")
    pub region: String,

    /// Custom endpoint for S3-compatible services
    /// Example: "http://localhost:9000"
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Base URL objects are publicly readable under, if any
    pub public_base_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            public_base_url: None,
        }
    }
}

impl S3BlobBackend {
    /// Create a new S3 blob backend
    pub async fn new(config: S3Config) -> StockroomResult<Self> {
        info!(
            "Initializing S3 blob storage (bucket: {}, region: {})",
            config.bucket, config.region
        );

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "stockroom",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and some S3-compatible services
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("✓ S3 blob storage initialized");

        Ok(Self {
            client: Arc::new(client),
            bucket: config.bucket,
            public_base_url: config
                .public_base_url
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }
}

fn object_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

#[async_trait]
impl BlobBackend for S3BlobBackend {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StockroomResult<()> {
        debug!(
            "Uploading object to S3: {} ({} bytes, type: {})",
            key,
            data.len(),
            content_type
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload object to S3: {}", e);
                StockroomError::BlobStorage(format!("S3 upload failed: {}", e))
            })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StockroomResult<Option<Vec<u8>>> {
        debug!("Downloading object from S3: {}", key);

        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => {
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| {
                        error!("Failed to read S3 object body: {}", e);
                        StockroomError::BlobStorage(format!("Failed to read S3 object: {}", e))
                    })?
                    .into_bytes()
                    .to_vec();

                Ok(Some(data))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    debug!("Object not found in S3: {}", key);
                    Ok(None)
                } else {
                    error!("Failed to download object from S3: {}", service_error);
                    Err(StockroomError::BlobStorage(format!(
                        "S3 download failed: {}",
                        service_error
                    )))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> StockroomResult<()> {
        debug!("Deleting object from S3: {}", key);

        // DeleteObject succeeds for keys that do not exist
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to delete object from S3: {}", e);
                StockroomError::BlobStorage(format!("S3 delete failed: {}", e))
            })?;

        Ok(())
    }

    async fn size(&self, key: &str) -> StockroomResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => Ok(response.content_length().map(|s| s.max(0) as u64)),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    error!("Failed to get object size from S3: {}", service_error);
                    Err(StockroomError::BlobStorage(format!(
                        "S3 head object failed: {}",
                        service_error
                    )))
                }
            }
        }
    }

    async fn signed_upload_url(&self, target: UploadTarget<'_>) -> StockroomResult<UploadDescriptor> {
        let ttl = (target.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StockroomError::BlobStorage(format!("Invalid presign TTL: {}", e)))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(target.key)
            .content_type(target.content_type)
            .set_content_length(target.content_length)
            .presigned(presigning)
            .await
            .map_err(|e| {
                error!("Failed to presign S3 upload: {}", e);
                StockroomError::BlobStorage(format!("S3 presign failed: {}", e))
            })?;

        let mut headers: HashMap<String, String> = request
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        if !headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_string(), target.content_type.to_string());
        }
        if let Some(length) = target.content_length {
            if !headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case("content-length"))
            {
                headers.insert("Content-Length".to_string(), length.to_string());
            }
        }

        Ok(UploadDescriptor {
            method: request.method().to_string(),
            url: request.uri().to_string(),
            headers,
        })
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_deref()
            .map(|base| object_url(base, key))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
