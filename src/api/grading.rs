use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::grading::{BatchGradeReport, BatchGradeRequest};
use crate::services::grading;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/batch", post(batch_grade))
}

async fn batch_grade(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<BatchGradeRequest>,
) -> Result<Json<BatchGradeReport>, ApiError> {
    Ok(Json(grading::batch_grade(&state, &tenant, payload.items).await?))
}
