/// Upload validation: content-type allow-list, size ceilings, file names
use crate::assets::{FileCategory, UploadFileRequest};
use crate::error::ValidationError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Longest file name kept in an object key
pub const MAX_FILE_NAME_LEN: usize = 80;

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

const VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/webm",
    "video/x-msvideo",
    "video/x-matroska",
];

const AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp4",
    "audio/aac",
    "audio/ogg",
    "audio/wav",
    "audio/x-wav",
];

const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.oasis.opendocument.text",
    "application/rtf",
    "text/plain",
];

/// A file request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub file_name: String,
    /// File name safe to embed in an object key
    pub key_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub category: FileCategory,
    /// Trimmed key; blank keys are dropped
    pub idempotency_key: Option<String>,
}

impl ValidatedFile {
    /// Hex SHA-256 over what the file was requested as
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(
            format!("{}|{}|{}", self.file_name, self.content_type, self.size_bytes).as_bytes(),
        );
        hex::encode(digest)
    }
}

/// Allow-list of content types per category, each with its own size ceiling
#[derive(Debug, Clone)]
pub struct FileTypePolicy {
    max_size_bytes: HashMap<FileCategory, i64>,
}

impl Default for FileTypePolicy {
    fn default() -> Self {
        Self::new(FileCategory::default_max_sizes())
    }
}

impl FileTypePolicy {
    pub fn new(max_size_bytes: HashMap<FileCategory, i64>) -> Self {
        Self { max_size_bytes }
    }

    /// Category of an allowed content type, `None` for anything unlisted
    pub fn category_of(&self, content_type: &str) -> Option<FileCategory> {
        let content_type = normalize_content_type(content_type);
        [
            (FileCategory::Image, IMAGE_TYPES),
            (FileCategory::Video, VIDEO_TYPES),
            (FileCategory::Audio, AUDIO_TYPES),
            (FileCategory::Document, DOCUMENT_TYPES),
        ]
        .into_iter()
        .find(|(_, allowed)| allowed.contains(&content_type.as_str()))
        .map(|(category, _)| category)
    }

    /// Size ceiling for a category
    pub fn max_size(&self, category: FileCategory) -> i64 {
        self.max_size_bytes
            .get(&category)
            .copied()
            .or_else(|| FileCategory::default_max_sizes().get(&category).copied())
            .unwrap_or(0)
    }

    /// Validate the file at `index` of a request
    pub fn validate(
        &self,
        index: usize,
        file: &UploadFileRequest,
    ) -> Result<ValidatedFile, ValidationError> {
        let field = |name: &str| format!("files[{}].{}", index, name);

        let file_name = file.file_name.trim();
        if file_name.is_empty() {
            return Err(ValidationError::MissingField {
                field: field("fileName"),
            });
        }

        let content_type = normalize_content_type(&file.content_type);
        if content_type.is_empty() {
            return Err(ValidationError::MissingField {
                field: field("contentType"),
            });
        }

        if file.size_bytes <= 0 {
            return Err(ValidationError::InvalidSize {
                field: field("sizeBytes"),
            });
        }

        let category = self.category_of(&content_type).ok_or_else(|| {
            ValidationError::FileTypeNotAllowed {
                field: field("contentType"),
                content_type: content_type.clone(),
            }
        })?;

        let max_bytes = self.max_size(category);
        if file.size_bytes > max_bytes {
            return Err(ValidationError::FileTooLarge {
                field: field("sizeBytes"),
                size_bytes: file.size_bytes,
                max_bytes,
            });
        }

        let idempotency_key = match file.idempotency_key.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(key) if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN => {
                return Err(ValidationError::Invalid {
                    field: field("idempotencyKey"),
                    message: format!("must be at most {} characters", MAX_IDEMPOTENCY_KEY_LEN),
                });
            }
            Some(key) => Some(key.to_string()),
        };

        Ok(ValidatedFile {
            file_name: file_name.to_string(),
            key_name: sanitize_file_name(file_name),
            content_type,
            size_bytes: file.size_bytes,
            category,
            idempotency_key,
        })
    }
}

/// Lower-case, drop parameters, and fold the `image/jpg` alias
pub fn normalize_content_type(raw: &str) -> String {
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => essence,
    }
}

/// Make a user-supplied file name safe for use as the last object key segment
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.trim().replace("..", "_");

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
