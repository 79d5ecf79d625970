/// Asset data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::error::ValidationError;

/// Content type every thumbnail row carries
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Prefix for generated asset ids
pub const ASSET_ID_PREFIX: &str = "ast";

/// Broad file category, derived from the content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
}

impl FileCategory {
    pub const ALL: [FileCategory; 4] = [
        FileCategory::Image,
        FileCategory::Video,
        FileCategory::Audio,
        FileCategory::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(FileCategory::Image),
            "video" => Some(FileCategory::Video),
            "audio" => Some(FileCategory::Audio),
            "document" => Some(FileCategory::Document),
            _ => None,
        }
    }

    /// Images and videos get a companion thumbnail upload
    pub fn needs_thumbnail(&self) -> bool {
        matches!(self, FileCategory::Image | FileCategory::Video)
    }

    pub fn default_max_sizes() -> HashMap<FileCategory, i64> {
        HashMap::from([
            (FileCategory::Image, 10 * 1024 * 1024),
            (FileCategory::Video, 100 * 1024 * 1024),
            (FileCategory::Audio, 20 * 1024 * 1024),
            (FileCategory::Document, 10 * 1024 * 1024),
        ])
    }
}

/// Lifecycle state, derived from the timestamp columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    Pending,
    Ready,
}

/// Uploaded asset row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub workspace_id: String,
    pub business_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub category: FileCategory,
    #[serde(skip_serializing)]
    pub object_key: String,
    pub public_url: String,
    pub cdn_url: String,
    pub thumbnail_of: Option<String>,
    pub upload_expires_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Client key that makes descriptor creation replayable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Fingerprint of the request the key was first used with
    #[serde(skip)]
    pub request_hash: Option<String>,
}

impl Asset {
    pub fn state(&self) -> AssetState {
        if self.ready_at.is_some() {
            AssetState::Ready
        } else {
            AssetState::Pending
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == AssetState::Ready
    }

    pub fn is_thumbnail(&self) -> bool {
        self.thumbnail_of.is_some()
    }

    /// URLs a domain entity might hold for this asset
    pub fn urls(&self) -> Vec<&str> {
        let mut urls = vec![self.public_url.as_str()];
        if !self.cdn_url.is_empty() && self.cdn_url != self.public_url {
            urls.push(self.cdn_url.as_str());
        }
        urls
    }
}

/// Business an operation is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub business_id: String,
    pub workspace_id: String,
}

/// Where the calling domain code intends to attach a completed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    BusinessLogo,
    ProductPhoto,
    VariantPhoto,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::BusinessLogo => "business_logo",
            Purpose::ProductPhoto => "product_photo",
            Purpose::VariantPhoto => "variant_photo",
        }
    }
}

impl std::str::FromStr for Purpose {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "business_logo" => Ok(Purpose::BusinessLogo),
            "product_photo" => Ok(Purpose::ProductPhoto),
            "variant_photo" => Ok(Purpose::VariantPhoto),
            other => Err(ValidationError::InvalidPurpose {
                purpose: other.to_string(),
            }),
        }
    }
}

/// One requested file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: i64,
    /// Repeating a request with the same key returns the asset created the first time
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Batch descriptor request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadsRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one file is required"))]
    pub files: Vec<UploadFileRequest>,
}

/// How the client must send the bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDescriptor {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Descriptor entry returned per accepted file
///
/// A replayed request for an asset that is already complete carries no upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUpload {
    pub asset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadDescriptor>,
    pub public_url: String,
    pub cdn_url: String,
    pub state: AssetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Box<CreatedUpload>>,
}

/// Completion request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    #[serde(default)]
    pub purpose: String,
}

/// Completion result; identical on every call for the same asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub asset_id: String,
    pub public_url: String,
    pub cdn_url: String,
    pub purpose: Purpose,
}
