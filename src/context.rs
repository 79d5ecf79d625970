/// Application context and dependency injection
use crate::{
    assets::{
        AssetRemoval, AssetRepository, AssetService, AssetUrls, CompletionHandler, FileTypePolicy,
        UploadDescriptorGenerator,
    },
    blob_store::{self, BlobBackend},
    config::{BlobstoreConfig, ServerConfig},
    db,
    domain::{self, BusinessStore, InventoryStore},
    error::{StockroomError, StockroomResult},
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub backend: Arc<dyn BlobBackend>,
    pub assets: Arc<AssetService>,
    pub rate_limiter: RateLimiter,
    // Collaborators that hold asset URLs
    pub businesses: Arc<BusinessStore>,
    pub inventory: Arc<InventoryStore>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> StockroomResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let backend = blob_store::connect(&config).await?;

        let repo = AssetRepository::new(db.clone());
        let urls = AssetUrls::new(
            &config.service.public_url,
            config.cdn.base_url.as_deref(),
            backend.clone(),
        );
        let policy = FileTypePolicy::new(config.uploads.max_size_bytes.clone());
        let ttl = i64::try_from(config.uploads.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| StockroomError::Config("Upload TTL out of range".to_string()))?;

        let uploads = UploadDescriptorGenerator::new(
            repo.clone(),
            backend.clone(),
            urls.clone(),
            policy.clone(),
            ttl,
            config.uploads.max_files,
        );
        let completion = CompletionHandler::new(repo.clone(), backend.clone(), policy);
        let removal = AssetRemoval::new(repo.clone(), backend.clone(), urls);
        let references = Arc::new(domain::reference_tracker(&db));
        tracing::info!(checkers = references.len(), "Reference checkers registered");

        let assets = Arc::new(AssetService::new(
            repo,
            backend.clone(),
            uploads,
            completion,
            removal,
            references,
        ));

        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            rate_limiter,
            businesses: Arc::new(BusinessStore::new(db.clone())),
            inventory: Arc::new(InventoryStore::new(db.clone())),
            db,
            backend,
            assets,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> StockroomResult<()> {
        let mut dirs = vec![config.storage.data_directory.clone()];
        if let Some(parent) = config.storage.database.parent() {
            dirs.push(parent.to_path_buf());
        }
        if let BlobstoreConfig::Disk { location } = &config.storage.blobstore {
            dirs.push(location.clone());
        }

        for dir in dirs {
            if dir.as_os_str().is_empty() || dir.exists() {
                continue;
            }
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                StockroomError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
