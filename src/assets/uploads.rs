/// Upload descriptor issuance
use crate::assets::repository::is_unique_violation;
use crate::assets::{
    policy::ValidatedFile, Asset, AssetRepository, AssetUrls, CreateUploadsRequest, CreatedUpload,
    FileCategory, FileTypePolicy, Tenant, UploadDescriptor, ASSET_ID_PREFIX,
    THUMBNAIL_CONTENT_TYPE,
};
use crate::blob_store::{BlobBackend, UploadTarget};
use crate::error::{StockroomError, StockroomResult, ValidationError};
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// File name given to every thumbnail object
const THUMBNAIL_FILE_NAME: &str = "thumbnail.jpg";

pub fn new_asset_id() -> String {
    format!("{}_{}", ASSET_ID_PREFIX, Uuid::new_v4().simple())
}

pub fn object_key(business_id: &str, asset_id: &str, key_name: &str) -> String {
    format!("business/{}/assets/{}/{}", business_id, asset_id, key_name)
}

/// Validates requested files, records pending rows and signs upload URLs
#[derive(Clone)]
pub struct UploadDescriptorGenerator {
    repo: AssetRepository,
    backend: Arc<dyn BlobBackend>,
    urls: AssetUrls,
    policy: FileTypePolicy,
    ttl: Duration,
    max_files: usize,
}

impl UploadDescriptorGenerator {
    pub fn new(
        repo: AssetRepository,
        backend: Arc<dyn BlobBackend>,
        urls: AssetUrls,
        policy: FileTypePolicy,
        ttl: Duration,
        max_files: usize,
    ) -> Self {
        Self {
            repo,
            backend,
            urls,
            policy,
            ttl,
            max_files,
        }
    }

    /// Create descriptors for every file of a request
    ///
    /// The whole batch is validated before anything is written; one bad file
    /// rejects the request. A file whose idempotency key was already used by
    /// this business gets the asset created the first time.
    pub async fn create(
        &self,
        tenant: &Tenant,
        request: &CreateUploadsRequest,
        now: DateTime<Utc>,
    ) -> StockroomResult<Vec<CreatedUpload>> {
        request.validate()?;
        if request.files.len() > self.max_files {
            return Err(ValidationError::TooManyFiles {
                max: self.max_files,
            }
            .into());
        }

        let files = request
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| self.policy.validate(index, file))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for (index, file) in files.iter().enumerate() {
            if let Some(key) = &file.idempotency_key {
                if !seen.insert(key.as_str()) {
                    return Err(ValidationError::Invalid {
                        field: format!("files[{}].idempotencyKey", index),
                        message: "repeats a key used earlier in the request".to_string(),
                    }
                    .into());
                }
            }
        }

        // A concurrent request holding the same key can win the insert; the
        // second pass then replays its rows
        match self.issue(tenant, &files, now).await {
            Err(e) if is_unique_violation(&e) && !seen.is_empty() => {
                tracing::debug!(business_id = %tenant.business_id, "Idempotency key raced, replaying");
                self.issue(tenant, &files, now).await
            }
            result => result,
        }
    }

    async fn issue(
        &self,
        tenant: &Tenant,
        files: &[ValidatedFile],
        now: DateTime<Utc>,
    ) -> StockroomResult<Vec<CreatedUpload>> {
        let expires_at = now + self.ttl;
        let mut rows = Vec::new();
        let mut created = Vec::with_capacity(files.len());
        let mut issued = 0;

        for file in files {
            if let Some(existing) = self.find_replay(tenant, file).await? {
                created.push(self.replay(&existing).await?);
                continue;
            }

            let parent = self.pending_row(tenant, file, now, expires_at);
            let thumbnail = file
                .category
                .needs_thumbnail()
                .then(|| self.thumbnail_row(&parent, now, expires_at));

            // Sign before inserting so a backend failure leaves no rows behind
            let mut entry = self
                .describe(&parent, file.size_bytes, Some(file.size_bytes))
                .await?;
            if let Some(thumb) = &thumbnail {
                entry.thumbnail = Some(Box::new(
                    self.describe(thumb, self.policy.max_size(FileCategory::Image), None)
                        .await?,
                ));
            }
            created.push(entry);

            rows.push(parent);
            rows.extend(thumbnail);
            metrics::UPLOAD_DESCRIPTORS_ISSUED
                .with_label_values(&[file.category.as_str()])
                .inc();
            issued += 1;
        }

        if !rows.is_empty() {
            self.repo.insert_pending(&rows).await?;
        }

        tracing::info!(
            business_id = %tenant.business_id,
            files = files.len(),
            issued,
            replayed = files.len() - issued,
            rows = rows.len(),
            "Issued upload descriptors"
        );

        Ok(created)
    }

    /// Earlier asset for the file's idempotency key, if the key was used before
    async fn find_replay(
        &self,
        tenant: &Tenant,
        file: &ValidatedFile,
    ) -> StockroomResult<Option<Asset>> {
        let Some(key) = &file.idempotency_key else {
            return Ok(None);
        };
        let Some(existing) = self
            .repo
            .find_by_idempotency_key(&tenant.business_id, key)
            .await?
        else {
            return Ok(None);
        };

        if existing.request_hash.as_deref() != Some(file.fingerprint().as_str()) {
            return Err(StockroomError::Conflict(format!(
                "idempotency key {} was used for a different file",
                key
            )));
        }
        Ok(Some(existing))
    }

    /// Rebuild the response for an asset created by an earlier request
    ///
    /// Pending rows get freshly signed URLs with their original expiry; ready
    /// rows come back without an upload.
    async fn replay(&self, existing: &Asset) -> StockroomResult<CreatedUpload> {
        let mut entry = if existing.is_ready() {
            self.entry(existing, None)
        } else {
            self.describe(existing, existing.size_bytes, Some(existing.size_bytes))
                .await?
        };

        let thumbnails = self.repo.find_thumbnails(&existing.id).await?;
        if let Some(thumb) = thumbnails.first() {
            entry.thumbnail = Some(Box::new(if thumb.is_ready() {
                self.entry(thumb, None)
            } else {
                self.describe(thumb, self.policy.max_size(FileCategory::Image), None)
                    .await?
            }));
        }

        tracing::debug!(asset_id = %existing.id, "Replayed upload descriptor");
        Ok(entry)
    }

    fn pending_row(
        &self,
        tenant: &Tenant,
        file: &ValidatedFile,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Asset {
        let id = new_asset_id();
        let object_key = object_key(&tenant.business_id, &id, &file.key_name);
        let public_url = self.urls.public_url(&id, &object_key);
        let cdn_url = self.urls.cdn_url(&object_key, &public_url);

        Asset {
            id,
            workspace_id: tenant.workspace_id.clone(),
            business_id: tenant.business_id.clone(),
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size_bytes,
            category: file.category,
            object_key,
            public_url,
            cdn_url,
            thumbnail_of: None,
            upload_expires_at: Some(expires_at),
            ready_at: None,
            created_at: now,
            request_hash: file.idempotency_key.as_ref().map(|_| file.fingerprint()),
            idempotency_key: file.idempotency_key.clone(),
        }
    }

    /// Thumbnail rows are always JPEG images; their size is unknown until completion
    fn thumbnail_row(&self, parent: &Asset, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Asset {
        let id = new_asset_id();
        let object_key = object_key(&parent.business_id, &id, THUMBNAIL_FILE_NAME);
        let public_url = self.urls.public_url(&id, &object_key);
        let cdn_url = self.urls.cdn_url(&object_key, &public_url);

        Asset {
            id,
            workspace_id: parent.workspace_id.clone(),
            business_id: parent.business_id.clone(),
            file_name: THUMBNAIL_FILE_NAME.to_string(),
            content_type: THUMBNAIL_CONTENT_TYPE.to_string(),
            size_bytes: 0,
            category: FileCategory::Image,
            object_key,
            public_url,
            cdn_url,
            thumbnail_of: Some(parent.id.clone()),
            upload_expires_at: Some(expires_at),
            ready_at: None,
            created_at: now,
            idempotency_key: None,
            request_hash: None,
        }
    }

    async fn describe(
        &self,
        asset: &Asset,
        max_bytes: i64,
        content_length: Option<i64>,
    ) -> StockroomResult<CreatedUpload> {
        let expires_at = asset.upload_expires_at.unwrap_or(asset.created_at);
        let upload = self
            .backend
            .signed_upload_url(UploadTarget {
                key: &asset.object_key,
                content_type: &asset.content_type,
                max_bytes,
                content_length,
                expires_at,
            })
            .await?;

        Ok(self.entry(asset, Some(upload)))
    }

    fn entry(&self, asset: &Asset, upload: Option<UploadDescriptor>) -> CreatedUpload {
        CreatedUpload {
            asset_id: asset.id.clone(),
            upload,
            public_url: asset.public_url.clone(),
            cdn_url: asset.cdn_url.clone(),
            state: asset.state(),
            expires_at: asset.upload_expires_at,
            thumbnail: None,
        }
    }
}
