/// Row-then-blob removal shared by garbage collection and explicit deletes
use crate::assets::repository::{DeleteGuard, DeletedRows};
use crate::assets::{Asset, AssetRepository, AssetUrls};
use crate::blob_store::BlobBackend;
use crate::error::StockroomResult;
use crate::metrics;
use std::sync::Arc;

/// Why an asset is being removed, for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    ExpiredPending,
    Orphaned,
    Requested,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::ExpiredPending => "expired_pending",
            RemovalReason::Orphaned => "orphaned",
            RemovalReason::Requested => "requested",
        }
    }
}

/// What one removal took out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    pub thumbnails: usize,
    pub blobs_deleted: usize,
    pub blob_failures: usize,
}

/// Deletes asset rows and then their objects
///
/// The row is the source of truth and goes first. Object deletion is best
/// effort: a failure leaves an unreachable object behind and is only logged.
#[derive(Clone)]
pub struct AssetRemoval {
    repo: AssetRepository,
    backend: Arc<dyn BlobBackend>,
    urls: AssetUrls,
}

impl AssetRemoval {
    pub fn new(repo: AssetRepository, backend: Arc<dyn BlobBackend>, urls: AssetUrls) -> Self {
        Self {
            repo,
            backend,
            urls,
        }
    }

    /// Every URL a domain entity could hold for this asset, thumbnails included
    pub async fn reference_urls(&self, asset: &Asset) -> StockroomResult<Vec<String>> {
        let mut urls: Vec<String> = asset.urls().into_iter().map(String::from).collect();
        for thumbnail in self.repo.find_thumbnails(&asset.id).await? {
            urls.extend(thumbnail.urls().into_iter().map(String::from));
        }
        urls.sort();
        urls.dedup();
        Ok(urls)
    }

    /// Remove an asset with its thumbnails
    ///
    /// `None` means the row was already gone or no longer matched `guard`.
    pub async fn remove(
        &self,
        asset_id: &str,
        guard: DeleteGuard,
        reason: RemovalReason,
    ) -> StockroomResult<Option<Removed>> {
        let Some(DeletedRows { asset, thumbnails }) =
            self.repo.delete_with_thumbnails(asset_id, guard).await?
        else {
            tracing::debug!(asset_id = %asset_id, reason = reason.as_str(), "Asset already removed or changed state");
            return Ok(None);
        };

        let mut removed = Removed {
            thumbnails: thumbnails.len(),
            ..Default::default()
        };

        for row in std::iter::once(&asset).chain(thumbnails.iter()) {
            match self.backend.delete(&row.object_key).await {
                Ok(()) => removed.blobs_deleted += 1,
                Err(e) => {
                    removed.blob_failures += 1;
                    metrics::ASSET_BLOB_DELETE_FAILURES.inc();
                    tracing::warn!(
                        asset_id = %row.id,
                        object_key = %row.object_key,
                        error = %e,
                        "Failed to delete asset object; row already removed"
                    );
                }
            }
            self.urls.forget(&row.id, &row.cdn_url);
        }

        metrics::ASSETS_DELETED
            .with_label_values(&[reason.as_str()])
            .inc();
        tracing::info!(
            asset_id = %asset.id,
            business_id = %asset.business_id,
            reason = reason.as_str(),
            thumbnails = removed.thumbnails,
            "Asset removed"
        );

        Ok(Some(removed))
    }
}
