/// Configuration management for the Stockroom asset service
use crate::assets::FileCategory;
use crate::error::{StockroomError, StockroomResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "stockroom=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub cdn: CdnConfig,
    pub gc: GcConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Externally reachable base URL, used for public asset URLs and local upload URLs
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub blobstore: BlobstoreConfig,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlobstoreConfig {
    Disk {
        location: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
        endpoint: Option<String>,
        /// Public base URL of the bucket, when objects are publicly readable
        public_base_url: Option<String>,
    },
}

/// Upload policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Secret used to sign local upload URLs
    pub signing_secret: String,
    /// How long a pending upload stays valid
    pub ttl_secs: u64,
    /// Maximum files per descriptor request
    pub max_files: usize,
    /// Per-category size ceilings in bytes
    pub max_size_bytes: HashMap<FileCategory, i64>,
}

/// CDN configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnConfig {
    pub base_url: Option<String>,
}

/// Asset garbage collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub pending_limit: usize,
    pub orphan_limit: usize,
    pub orphan_min_age_secs: u64,
}

/// Per-business limits on asset mutations, in requests per minute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub create_per_minute: u32,
    pub complete_per_minute: u32,
    pub delete_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            create_per_minute: 60,
            complete_per_minute: 120,
            delete_per_minute: 120,
        }
    }
}

/// Admin endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for maintenance endpoints; endpoints are disabled when unset
    pub token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Local-disk configuration rooted at `data_directory`
    pub fn defaults(data_directory: PathBuf) -> Self {
        let hostname = "localhost".to_string();
        let port = 8080;

        Self {
            service: ServiceConfig {
                public_url: format!("http://{}:{}", hostname, port),
                hostname,
                port,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                database: data_directory.join("stockroom.sqlite"),
                blobstore: BlobstoreConfig::Disk {
                    location: data_directory.join("assets"),
                },
                data_directory,
            },
            uploads: UploadConfig {
                signing_secret: "insecure-development-signing-secret-change-me".to_string(),
                ttl_secs: 15 * 60,
                max_files: 10,
                max_size_bytes: FileCategory::default_max_sizes(),
            },
            cdn: CdnConfig::default(),
            gc: GcConfig {
                enabled: true,
                interval_secs: 3600,
                pending_limit: 500,
                orphan_limit: 500,
                orphan_min_age_secs: 30 * 60,
            },
            rate_limit: RateLimitConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig {
                level: DEFAULT_LOG_FILTER.to_string(),
                json: false,
            },
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> StockroomResult<Self> {
        dotenv::dotenv().ok();

        let data_directory: PathBuf = env::var("STOCKROOM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let mut config = Self::defaults(data_directory.clone());

        if let Ok(hostname) = env::var("STOCKROOM_HOSTNAME") {
            config.service.hostname = hostname;
        }
        config.service.port = env::var("STOCKROOM_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| StockroomError::Config("Invalid port number".to_string()))?;
        config.service.public_url = env::var("STOCKROOM_PUBLIC_URL")
            .unwrap_or_else(|_| {
                format!("http://{}:{}", config.service.hostname, config.service.port)
            })
            .trim_end_matches('/')
            .to_string();

        config.storage.database = env::var("STOCKROOM_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("stockroom.sqlite"));

        config.storage.blobstore = if let Ok(bucket) = env::var("STOCKROOM_BLOBSTORE_S3_BUCKET") {
            BlobstoreConfig::S3 {
                bucket,
                region: env::var("STOCKROOM_BLOBSTORE_S3_REGION")
                    .unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: env::var("STOCKROOM_BLOBSTORE_S3_ACCESS_KEY_ID").map_err(|_| {
                    StockroomError::Config("S3 access key required".to_string())
                })?,
                secret_access_key: env::var("STOCKROOM_BLOBSTORE_S3_SECRET_ACCESS_KEY")
                    .map_err(|_| StockroomError::Config("S3 secret key required".to_string()))?,
                endpoint: env::var("STOCKROOM_BLOBSTORE_S3_ENDPOINT").ok(),
                public_base_url: env::var("STOCKROOM_BLOBSTORE_S3_PUBLIC_BASE_URL").ok(),
            }
        } else {
            BlobstoreConfig::Disk {
                location: env::var("STOCKROOM_BLOBSTORE_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("assets")),
            }
        };

        config.uploads.signing_secret = env::var("STOCKROOM_UPLOAD_SIGNING_SECRET")
            .map_err(|_| StockroomError::Config("Upload signing secret required".to_string()))?;
        config.uploads.ttl_secs = env_or("STOCKROOM_UPLOAD_TTL_SECS", config.uploads.ttl_secs);
        config.uploads.max_files = env_or("STOCKROOM_UPLOAD_MAX_FILES", config.uploads.max_files);
        for category in FileCategory::ALL {
            let key = format!(
                "STOCKROOM_UPLOAD_MAX_{}_BYTES",
                category.as_str().to_uppercase()
            );
            if let Some(max) = env::var(&key).ok().and_then(|v| v.parse::<i64>().ok()) {
                config.uploads.max_size_bytes.insert(category, max);
            }
        }

        config.cdn.base_url = env::var("STOCKROOM_CDN_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        config.gc.enabled = env_or("STOCKROOM_GC_ENABLED", config.gc.enabled);
        config.gc.interval_secs = env_or("STOCKROOM_GC_INTERVAL_SECS", config.gc.interval_secs);
        config.gc.pending_limit = env_or("STOCKROOM_GC_PENDING_LIMIT", config.gc.pending_limit);
        config.gc.orphan_limit = env_or("STOCKROOM_GC_ORPHAN_LIMIT", config.gc.orphan_limit);
        config.gc.orphan_min_age_secs =
            env_or("STOCKROOM_GC_ORPHAN_MIN_AGE_SECS", config.gc.orphan_min_age_secs);

        config.rate_limit.enabled =
            env_or("STOCKROOM_RATE_LIMIT_ENABLED", config.rate_limit.enabled);
        config.rate_limit.create_per_minute = env_or(
            "STOCKROOM_RATE_LIMIT_CREATE_PER_MINUTE",
            config.rate_limit.create_per_minute,
        );
        config.rate_limit.complete_per_minute = env_or(
            "STOCKROOM_RATE_LIMIT_COMPLETE_PER_MINUTE",
            config.rate_limit.complete_per_minute,
        );
        config.rate_limit.delete_per_minute = env_or(
            "STOCKROOM_RATE_LIMIT_DELETE_PER_MINUTE",
            config.rate_limit.delete_per_minute,
        );

        config.admin.token = env::var("STOCKROOM_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        if let Ok(level) = env::var("RUST_LOG") {
            config.logging.level = level;
        }
        config.logging.json = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> StockroomResult<()> {
        if self.service.hostname.is_empty() {
            return Err(StockroomError::Config("Hostname cannot be empty".to_string()));
        }

        if self.uploads.signing_secret.len() < 32 {
            return Err(StockroomError::Config(
                "Upload signing secret must be at least 32 characters".to_string(),
            ));
        }

        if self.uploads.ttl_secs == 0 {
            return Err(StockroomError::Config(
                "Upload TTL must be greater than zero".to_string(),
            ));
        }

        if i64::try_from(self.gc.orphan_min_age_secs)
            .map_or(true, |secs| secs > crate::assets::gc::MAX_ORPHAN_MIN_AGE_SECS)
        {
            return Err(StockroomError::Config(
                "GC orphan min age exceeds one hundred years".to_string(),
            ));
        }

        if self.gc.pending_limit == 0 || self.gc.orphan_limit == 0 {
            return Err(StockroomError::Config(
                "GC limits must be greater than zero".to_string(),
            ));
        }

        let limits = &self.rate_limit;
        if limits.enabled
            && (limits.create_per_minute == 0
                || limits.complete_per_minute == 0
                || limits.delete_per_minute == 0)
        {
            return Err(StockroomError::Config(
                "Rate limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
