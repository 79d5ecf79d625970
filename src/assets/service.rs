/// Asset service: the operations other modules and the HTTP layer call
use crate::assets::gc::{GarbageCollector, GcOptions, GcReport};
use crate::assets::removal::{AssetRemoval, RemovalReason};
use crate::assets::repository::DeleteGuard;
use crate::assets::{
    Asset, AssetRepository, CompletedUpload, CompletionHandler, CreateUploadsRequest,
    CreatedUpload, Purpose, ReferenceTracker, Tenant, UploadDescriptorGenerator,
};
use crate::blob_store::BlobBackend;
use crate::error::{StockroomError, StockroomResult};
use chrono::Utc;
use std::sync::Arc;

/// A ready asset with its bytes
#[derive(Debug, Clone)]
pub struct PublicObject {
    pub asset: Asset,
    pub data: Vec<u8>,
}

/// Asset service
#[derive(Clone)]
pub struct AssetService {
    repo: AssetRepository,
    backend: Arc<dyn BlobBackend>,
    uploads: UploadDescriptorGenerator,
    completion: CompletionHandler,
    removal: AssetRemoval,
    references: Arc<ReferenceTracker>,
    gc: Arc<GarbageCollector>,
}

impl AssetService {
    pub fn new(
        repo: AssetRepository,
        backend: Arc<dyn BlobBackend>,
        uploads: UploadDescriptorGenerator,
        completion: CompletionHandler,
        removal: AssetRemoval,
        references: Arc<ReferenceTracker>,
    ) -> Self {
        let gc = Arc::new(GarbageCollector::new(
            repo.clone(),
            removal.clone(),
            references.clone(),
        ));

        Self {
            repo,
            backend,
            uploads,
            completion,
            removal,
            references,
            gc,
        }
    }

    pub async fn create_upload_descriptors(
        &self,
        tenant: &Tenant,
        request: &CreateUploadsRequest,
    ) -> StockroomResult<Vec<CreatedUpload>> {
        self.uploads.create(tenant, request, Utc::now()).await
    }

    pub async fn complete_upload(
        &self,
        tenant: &Tenant,
        asset_id: &str,
        purpose: &str,
    ) -> StockroomResult<CompletedUpload> {
        let purpose: Purpose = purpose.parse()?;
        self.completion
            .complete(tenant, asset_id.trim(), purpose, Utc::now())
            .await
    }

    /// Asset metadata, scoped to the tenant
    pub async fn get_asset(&self, tenant: &Tenant, asset_id: &str) -> StockroomResult<Asset> {
        self.find(tenant, asset_id).await
    }

    /// Delete an asset nobody references
    ///
    /// The reference check runs on every call; a referenced asset is left
    /// untouched and reported as a conflict.
    pub async fn delete_asset(&self, tenant: &Tenant, asset_id: &str) -> StockroomResult<()> {
        let asset = self.find(tenant, asset_id).await?;

        let urls = self.removal.reference_urls(&asset).await?;
        let holders = self
            .references
            .referencing(&asset.business_id, &urls)
            .await?;
        if !holders.is_empty() {
            tracing::info!(
                asset_id = %asset.id,
                referenced_by = ?holders,
                "Refusing to delete referenced asset"
            );
            return Err(StockroomError::Conflict(format!(
                "asset is referenced by {}",
                holders.join(", ")
            )));
        }

        // A concurrent delete or sweep may have won; the asset is gone either way
        self.removal
            .remove(&asset.id, DeleteGuard::Unconditional, RemovalReason::Requested)
            .await?;
        Ok(())
    }

    /// Ready asset and its bytes for public serving
    ///
    /// Unknown, pending and deleted assets are all not found, whether or not
    /// an object still exists in storage.
    pub async fn get_public_object(&self, asset_id: &str) -> StockroomResult<PublicObject> {
        let not_found = || StockroomError::NotFound(format!("asset {}", asset_id));

        let asset = self
            .repo
            .find_by_id(asset_id)
            .await?
            .filter(Asset::is_ready)
            .ok_or_else(not_found)?;

        let data = match self.backend.get(&asset.object_key).await? {
            Some(data) => data,
            None => {
                tracing::warn!(asset_id = %asset.id, object_key = %asset.object_key, "Ready asset has no object");
                return Err(not_found());
            }
        };

        Ok(PublicObject { asset, data })
    }

    pub async fn garbage_collect(&self, options: GcOptions) -> StockroomResult<GcReport> {
        self.gc.run(options).await
    }

    async fn find(&self, tenant: &Tenant, asset_id: &str) -> StockroomResult<Asset> {
        self.repo
            .find_scoped(&tenant.business_id, asset_id.trim())
            .await?
            .filter(|asset| asset.workspace_id == tenant.workspace_id)
            .ok_or_else(|| StockroomError::NotFound(format!("asset {}", asset_id)))
    }
}
