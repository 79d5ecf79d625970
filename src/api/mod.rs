/// API routes and handlers
pub mod admin;
pub mod assets;
pub mod business;
pub mod health;
pub mod middleware;
pub mod public;
pub mod uploads;

use crate::config::ServerConfig;
use crate::context::AppContext;
use axum::Router;

/// Body size ceiling when no category limit is configured
const DEFAULT_UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Build API routes
pub fn routes(config: &ServerConfig) -> Router<AppContext> {
    let upload_body_limit = config
        .uploads
        .max_size_bytes
        .values()
        .copied()
        .max()
        .and_then(|max| usize::try_from(max).ok())
        .unwrap_or(DEFAULT_UPLOAD_BODY_LIMIT);

    Router::new()
        .merge(health::routes())
        .merge(assets::routes())
        .merge(uploads::routes(upload_body_limit))
        .merge(public::routes())
        .merge(business::routes())
        .merge(admin::routes())
}
