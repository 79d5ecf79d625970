/// Request middleware and admin authorization
use crate::{
    context::AppContext,
    error::{StockroomError, StockroomResult},
    metrics,
};
use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Require the configured admin token
///
/// Admin endpoints are disabled entirely when no token is configured.
pub fn require_admin(ctx: &AppContext, headers: &HeaderMap) -> StockroomResult<()> {
    let expected = ctx
        .config
        .admin
        .token
        .as_deref()
        .ok_or_else(|| StockroomError::Forbidden("admin endpoints are disabled".to_string()))?;

    let presented = extract_bearer_token(headers)
        .ok_or_else(|| StockroomError::Forbidden("missing admin token".to_string()))?;

    // Compare digests so the comparison time does not depend on the token prefix
    if Sha256::digest(presented.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        return Err(StockroomError::Forbidden("invalid admin token".to_string()));
    }

    Ok(())
}

/// Record request count and latency per matched route
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
