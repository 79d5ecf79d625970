/// Public and CDN URL construction
use crate::blob_store::BlobBackend;
use std::sync::Arc;

/// Route the public read-through endpoint is mounted on
pub const PUBLIC_ASSET_ROUTE: &str = "/v1/public/assets";

/// Builds the URLs an asset is served under
#[derive(Clone)]
pub struct AssetUrls {
    service_base: String,
    cdn_base: Option<String>,
    backend: Arc<dyn BlobBackend>,
}

impl AssetUrls {
    pub fn new(service_base: &str, cdn_base: Option<&str>, backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            service_base: service_base.trim_end_matches('/').to_string(),
            cdn_base: cdn_base
                .map(|base| base.trim_end_matches('/').to_string())
                .filter(|base| !base.is_empty()),
            backend,
        }
    }

    /// Storage URL when the backend serves objects itself, otherwise this service's proxy
    pub fn public_url(&self, asset_id: &str, object_key: &str) -> String {
        self.backend
            .public_url(object_key)
            .unwrap_or_else(|| format!("{}{}/{}", self.service_base, PUBLIC_ASSET_ROUTE, asset_id))
    }

    /// CDN URL for an object, falling back to the public URL without a CDN
    pub fn cdn_url(&self, object_key: &str, public_url: &str) -> String {
        match &self.cdn_base {
            Some(base) => format!("{}/{}", base, object_key),
            None => public_url.to_string(),
        }
    }

    pub fn cdn_enabled(&self) -> bool {
        self.cdn_base.is_some()
    }

    /// Drop a deleted asset's CDN URL
    ///
    /// Cache invalidation is left to the CDN's own TTL; this only records that
    /// the URL is dead.
    pub fn forget(&self, asset_id: &str, cdn_url: &str) {
        if self.cdn_enabled() {
            tracing::info!(asset_id = %asset_id, cdn_url = %cdn_url, "CDN URL dropped");
        }
    }
}
