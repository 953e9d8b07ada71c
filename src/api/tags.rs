use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::question::{TagCreate, TagResponse};
use crate::services::question_bank;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/:tag_id", delete(delete_tag))
}

async fn create_tag(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<TagCreate>,
) -> Result<(StatusCode, Json<TagResponse>), ApiError> {
    let tag = question_bank::create_tag(&state, &tenant, payload).await?;
    Ok((StatusCode::CREATED, Json(TagResponse::from_db(tag))))
}

async fn list_tags(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
) -> Result<Json<Vec<TagResponse>>, ApiError> {
    let tags = question_bank::list_tags(&state, &tenant).await?;
    Ok(Json(tags.into_iter().map(TagResponse::from_db).collect()))
}

async fn delete_tag(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(tag_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    question_bank::delete_tag(&state, &tenant, &tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
