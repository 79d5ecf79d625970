/// Signed upload target for the local-disk blob store
///
/// Disk-backed deployments hand clients `PUT /v1/uploads/<key>` URLs instead of
/// a provider presigned URL. The signature binds the key, content type, size
/// ceiling and expiry, so the bytes land exactly where the pending row expects.
use crate::{
    assets::{policy::normalize_content_type, AssetRepository},
    blob_store::{signing::UPLOAD_ROUTE_PREFIX, UploadSigner},
    config::BlobstoreConfig,
    context::AppContext,
    error::{StockroomError, StockroomResult, ValidationError},
    metrics,
};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::put,
    Router,
};
use chrono::Utc;
use serde::Deserialize;

/// Query parameters carried by a signed upload URL
#[derive(Debug, Deserialize)]
pub struct SignedUploadQuery {
    pub expires: i64,
    pub max: i64,
    pub signature: String,
}

/// Build upload routes; `max_body_bytes` caps what the extractor will buffer
pub fn routes(max_body_bytes: usize) -> Router<AppContext> {
    Router::new()
        .route(&format!("{}/*key", UPLOAD_ROUTE_PREFIX), put(put_object))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// Accept the bytes for a signed upload URL
async fn put_object(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    Query(query): Query<SignedUploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> StockroomResult<StatusCode> {
    if !matches!(ctx.config.storage.blobstore, BlobstoreConfig::Disk { .. }) {
        return Err(StockroomError::NotFound(
            "local uploads are not enabled".to_string(),
        ));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_content_type)
        .unwrap_or_default();

    // A mismatched content type fails the signature check
    let signer = UploadSigner::new(
        ctx.config.uploads.signing_secret.clone(),
        ctx.config.service.public_url.clone(),
    );
    signer.verify(
        &key,
        &content_type,
        query.max,
        query.expires,
        &query.signature,
        Utc::now(),
    )?;

    // Only a pending row accepts bytes; completed assets keep what was verified
    let asset = AssetRepository::new(ctx.db.clone())
        .find_by_object_key(&key)
        .await?
        .ok_or_else(|| StockroomError::NotFound(format!("No pending upload for {}", key)))?;
    if asset.is_ready() {
        return Err(StockroomError::Conflict(format!(
            "Asset {} is already complete",
            asset.id
        )));
    }

    let size = body.len() as i64;
    if size == 0 {
        return Err(ValidationError::InvalidSize {
            field: "body".to_string(),
        }
        .into());
    }
    if size > query.max {
        return Err(ValidationError::FileTooLarge {
            field: "body".to_string(),
            size_bytes: size,
            max_bytes: query.max,
        }
        .into());
    }

    ctx.backend.put(&key, body.to_vec(), &content_type).await?;
    metrics::UPLOAD_BYTES.inc_by(size as u64);

    tracing::debug!(object_key = %key, size_bytes = size, "Upload stored");
    Ok(StatusCode::NO_CONTENT)
}
