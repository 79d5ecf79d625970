/// Completion of pending uploads
use crate::assets::{Asset, AssetRepository, CompletedUpload, FileTypePolicy, Purpose, Tenant};
use crate::blob_store::BlobBackend;
use crate::error::{StockroomError, StockroomResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Moves a pending asset to ready once its bytes are in storage
#[derive(Clone)]
pub struct CompletionHandler {
    repo: AssetRepository,
    backend: Arc<dyn BlobBackend>,
    policy: FileTypePolicy,
}

impl CompletionHandler {
    pub fn new(repo: AssetRepository, backend: Arc<dyn BlobBackend>, policy: FileTypePolicy) -> Self {
        Self {
            repo,
            backend,
            policy,
        }
    }

    /// Complete an upload
    ///
    /// Calling this again for a ready asset returns the same result without
    /// touching storage or timestamps.
    pub async fn complete(
        &self,
        tenant: &Tenant,
        asset_id: &str,
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> StockroomResult<CompletedUpload> {
        let asset = self.find(tenant, asset_id).await?;
        if asset.is_ready() {
            tracing::debug!(asset_id = %asset.id, "Upload already complete");
            return Ok(completed(&asset, purpose));
        }

        let observed = self
            .backend
            .size(&asset.object_key)
            .await?
            .ok_or_else(|| {
                StockroomError::Conflict(format!("upload for asset {} not found in storage", asset.id))
            })?;
        let observed = i64::try_from(observed)
            .map_err(|_| StockroomError::Conflict("uploaded object too large".to_string()))?;

        let max_bytes = self.policy.max_size(asset.category);
        if observed > max_bytes {
            return Err(StockroomError::Conflict(format!(
                "uploaded object is {} bytes, limit is {}",
                observed, max_bytes
            )));
        }

        if !self.repo.mark_ready(&asset.id, observed, now).await? {
            // Lost a race with another completion, or the row was collected
            let current = self.find(tenant, asset_id).await?;
            if current.is_ready() {
                return Ok(completed(&current, purpose));
            }
            return Err(StockroomError::Conflict(format!(
                "asset {} changed during completion",
                asset.id
            )));
        }

        metrics::UPLOADS_COMPLETED.inc();
        tracing::info!(
            asset_id = %asset.id,
            business_id = %asset.business_id,
            declared_bytes = asset.size_bytes,
            observed_bytes = observed,
            purpose = purpose.as_str(),
            "Upload completed"
        );

        Ok(completed(&asset, purpose))
    }

    async fn find(&self, tenant: &Tenant, asset_id: &str) -> StockroomResult<Asset> {
        self.repo
            .find_scoped(&tenant.business_id, asset_id)
            .await?
            .filter(|asset| asset.workspace_id == tenant.workspace_id)
            .ok_or_else(|| StockroomError::NotFound(format!("asset {}", asset_id)))
    }
}

fn completed(asset: &Asset, purpose: Purpose) -> CompletedUpload {
    CompletedUpload {
        asset_id: asset.id.clone(),
        public_url: asset.public_url.clone(),
        cdn_url: asset.cdn_url.clone(),
        purpose,
    }
}
