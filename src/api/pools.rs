use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::pool::{
    GenerateRequest, GenerationResponse, PoolCreate, PoolResponse, PoolUpdate,
};
use crate::services::errors::AssessmentError;
use crate::services::question_pool;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pools).post(create_pool))
        .route("/:pool_id", get(get_pool).put(update_pool).delete(delete_pool))
        .route("/:pool_id/generate", post(generate))
}

async fn create_pool(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<PoolCreate>,
) -> Result<(StatusCode, Json<PoolResponse>), ApiError> {
    let pool = question_pool::create_pool(&state, &tenant, payload).await?;
    Ok((StatusCode::CREATED, Json(PoolResponse::from_db(pool))))
}

async fn list_pools(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
) -> Result<Json<Vec<PoolResponse>>, ApiError> {
    let pools = question_pool::list_pools(&state, &tenant).await?;
    Ok(Json(pools.into_iter().map(PoolResponse::from_db).collect()))
}

async fn get_pool(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(pool_id): Path<String>,
) -> Result<Json<PoolResponse>, ApiError> {
    let pool = question_pool::get_pool(&state, &tenant, &pool_id).await?;
    Ok(Json(PoolResponse::from_db(pool)))
}

async fn update_pool(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(pool_id): Path<String>,
    Json(payload): Json<PoolUpdate>,
) -> Result<Json<PoolResponse>, ApiError> {
    let pool = question_pool::update_pool(&state, &tenant, &pool_id, payload).await?;
    Ok(Json(PoolResponse::from_db(pool)))
}

async fn delete_pool(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(pool_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    question_pool::delete_pool(&state, &tenant, &pool_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(pool_id): Path<String>,
    payload: Option<Json<GenerateRequest>>,
) -> Result<(StatusCode, Json<GenerationResponse>), ApiError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    request.validate().map_err(AssessmentError::from)?;
    let generation = question_pool::generate(
        &state,
        &tenant,
        &pool_id,
        request.requested_total,
        request.quiz_id.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(GenerationResponse::from_db(generation))))
}
