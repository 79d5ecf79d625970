/// Business-scoped asset endpoints
use crate::{
    assets::{Asset, CompleteUploadRequest, CompletedUpload, CreateUploadsRequest, CreatedUpload},
    context::AppContext,
    error::StockroomResult,
    rate_limit::AssetOperation,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

/// Build asset routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/v1/businesses/:business_id/assets/uploads",
            post(create_upload_descriptors),
        )
        .route(
            "/v1/businesses/:business_id/assets/:asset_id",
            get(get_asset).delete(delete_asset),
        )
        .route(
            "/v1/businesses/:business_id/assets/:asset_id/complete",
            post(complete_upload),
        )
}

/// Issue upload descriptors for a batch of files
async fn create_upload_descriptors(
    State(ctx): State<AppContext>,
    Path(business_id): Path<String>,
    Json(request): Json<CreateUploadsRequest>,
) -> StockroomResult<(StatusCode, Json<Vec<CreatedUpload>>)> {
    let tenant = ctx.businesses.tenant(&business_id).await?;
    ctx.rate_limiter
        .check(&tenant.business_id, AssetOperation::CreateUpload)?;
    let uploads = ctx.assets.create_upload_descriptors(&tenant, &request).await?;

    tracing::info!(
        business_id = %business_id,
        files = request.files.len(),
        "Upload descriptors issued"
    );
    Ok((StatusCode::CREATED, Json(uploads)))
}

/// Mark an uploaded asset ready
async fn complete_upload(
    State(ctx): State<AppContext>,
    Path((business_id, asset_id)): Path<(String, String)>,
    Json(request): Json<CompleteUploadRequest>,
) -> StockroomResult<Json<CompletedUpload>> {
    let tenant = ctx.businesses.tenant(&business_id).await?;
    ctx.rate_limiter
        .check(&tenant.business_id, AssetOperation::CompleteUpload)?;
    let completed = ctx
        .assets
        .complete_upload(&tenant, &asset_id, &request.purpose)
        .await?;
    Ok(Json(completed))
}

async fn get_asset(
    State(ctx): State<AppContext>,
    Path((business_id, asset_id)): Path<(String, String)>,
) -> StockroomResult<Json<Asset>> {
    let tenant = ctx.businesses.tenant(&business_id).await?;
    Ok(Json(ctx.assets.get_asset(&tenant, &asset_id).await?))
}

/// Delete an unreferenced asset; 409 while anything still points at it
async fn delete_asset(
    State(ctx): State<AppContext>,
    Path((business_id, asset_id)): Path<(String, String)>,
) -> StockroomResult<StatusCode> {
    let tenant = ctx.businesses.tenant(&business_id).await?;
    ctx.rate_limiter
        .check(&tenant.business_id, AssetOperation::Delete)?;
    ctx.assets.delete_asset(&tenant, &asset_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
