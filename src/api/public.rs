/// Public read-through for ready assets
use crate::{assets::cdn::PUBLIC_ASSET_ROUTE, context::AppContext, error::StockroomResult};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sha2::{Digest, Sha256};

const CACHE_CONTROL: &str = "public, max-age=3600";

/// Build public asset routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(&format!("{}/:asset_id", PUBLIC_ASSET_ROUTE), get(get_asset_object))
}

/// Serve a ready asset's bytes
///
/// Supports conditional requests through `If-None-Match` and single byte
/// ranges through `Range`. Pending and deleted assets are 404.
async fn get_asset_object(
    State(ctx): State<AppContext>,
    Path(asset_id): Path<String>,
    headers: HeaderMap,
) -> StockroomResult<Response> {
    let object = ctx.assets.get_public_object(&asset_id).await?;
    let content_type = object.asset.content_type.clone();
    let data = object.data;
    let total_size = data.len();

    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if etag_matches(if_none_match, &etag) {
            return Ok((
                StatusCode::NOT_MODIFIED,
                [
                    (header::ETAG, etag),
                    (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
                ],
            )
                .into_response());
        }
    }

    if let Some(range) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|range| parse_range(range, total_size))
    {
        let (start, end) = range;
        let partial = data[start..=end].to_vec();

        return Ok((
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, partial.len().to_string()),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, total_size),
                ),
                (header::ETAG, etag),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::from(partial),
        )
            .into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, total_size.to_string()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from(data),
    )
        .into_response())
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// Parse HTTP Range header
///
/// Returns (start, end) inclusive byte positions, or None if invalid
fn parse_range(range_header: &str, total_size: usize) -> Option<(usize, usize)> {
    // Expected format: "bytes=start-end" or "bytes=start-" or "bytes=-suffix"
    let range_spec = range_header.trim().strip_prefix("bytes=")?;
    if total_size == 0 {
        return None;
    }

    let (start_str, end_str) = range_spec.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "bytes=-500" (last 500 bytes)
        let suffix = end_str.parse::<usize>().ok().filter(|s| *s > 0)?;
        return Some((total_size.saturating_sub(suffix), total_size - 1));
    }

    let start = start_str.parse::<usize>().ok()?;
    if start >= total_size {
        return None;
    }

    if end_str.is_empty() {
        // Open-ended range: "bytes=500-"
        return Some((start, total_size - 1));
    }

    let end = end_str.parse::<usize>().ok()?.min(total_size - 1);
    (start <= end).then_some((start, end))
}
