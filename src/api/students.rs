use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::statistics::StudentTrend;
use crate::services::statistics;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:student_id/trend", get(student_trend))
}

async fn student_trend(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(student_id): Path<String>,
) -> Result<Json<StudentTrend>, ApiError> {
    Ok(Json(statistics::student_trend(&state, &tenant, &student_id).await?))
}
