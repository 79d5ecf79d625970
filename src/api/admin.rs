/// Admin API endpoints
///
/// Maintenance operations guarded by the configured admin bearer token.
use crate::{
    api::middleware::require_admin,
    assets::{orphan_min_age, GcOptions, GcReport},
    context::AppContext,
    error::StockroomResult,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/v1/admin/assets/gc", post(run_asset_gc))
}

/// Overrides for a manual sweep; unset fields use the configured values
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GcRequest {
    pending_limit: Option<usize>,
    orphan_limit: Option<usize>,
    orphan_min_age_secs: Option<i64>,
    dry_run: bool,
}

/// Run one GC sweep now
async fn run_asset_gc(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<GcRequest>,
) -> StockroomResult<Json<GcReport>> {
    require_admin(&ctx, &headers)?;

    let mut options = GcOptions::from_config(&ctx.config.gc, Utc::now())?;
    if let Some(limit) = req.pending_limit {
        options.pending_limit = limit;
    }
    if let Some(limit) = req.orphan_limit {
        options.orphan_limit = limit;
    }
    if let Some(secs) = req.orphan_min_age_secs {
        options.orphan_min_age = orphan_min_age(secs)?;
    }
    options.dry_run = req.dry_run;

    tracing::info!(
        pending_limit = options.pending_limit,
        orphan_limit = options.orphan_limit,
        dry_run = options.dry_run,
        "Manual asset GC requested"
    );

    Ok(Json(ctx.assets.garbage_collect(options).await?))
}
