/// Background task implementations
use crate::{
    assets::{GcOptions, GcReport},
    context::AppContext,
    error::StockroomResult,
};
use chrono::Utc;

/// One scheduled GC sweep with the configured limits
pub async fn collect_asset_garbage(ctx: &AppContext) -> StockroomResult<GcReport> {
    let options = GcOptions::from_config(&ctx.config.gc, Utc::now())?;
    ctx.assets.garbage_collect(options).await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> StockroomResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}
