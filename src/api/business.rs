/// Business update endpoint
///
/// The only collaborator endpoint exposed here; it lets clients point a
/// business logo at an uploaded asset or clear it.
use crate::{
    context::AppContext,
    domain::{Business, UpdateBusinessRequest},
    error::StockroomResult,
};
use axum::{
    extract::{Path, State},
    routing::patch,
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/v1/businesses/:business_id", patch(update_business))
}

async fn update_business(
    State(ctx): State<AppContext>,
    Path(business_id): Path<String>,
    Json(request): Json<UpdateBusinessRequest>,
) -> StockroomResult<Json<Business>> {
    let business = ctx.businesses.update(&business_id, &request).await?;
    tracing::info!(business_id = %business.id, logo_url = ?business.logo_url, "Business updated");
    Ok(Json(business))
}
