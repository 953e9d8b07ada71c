use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::attempt::{
    AnswersRequest, AttemptResponse, AttemptReview, AttemptSummary, ResponseView,
};
use crate::schemas::grading::{GradeResult, ManualGradeRequest, SuggestionResult};
use crate::services::{attempts, grading};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/answers", put(save_answers))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/finalize", post(finalize_attempt))
        .route("/:attempt_id/review", get(review_attempt))
        .route("/:attempt_id/summary", get(attempt_summary))
        .route("/:attempt_id/responses/:question_id/grade", post(grade_response))
        .route("/:attempt_id/responses/:question_id/suggestion", post(suggest_score))
}

async fn get_attempt(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = attempts::get_attempt(&state, &tenant, &attempt_id).await?;
    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn save_answers(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
    Json(payload): Json<AnswersRequest>,
) -> Result<Json<Vec<ResponseView>>, ApiError> {
    let responses = attempts::save_answers(&state, &tenant, &attempt_id, payload.answers).await?;
    Ok(Json(responses.into_iter().map(ResponseView::from_db).collect()))
}

async fn submit_attempt(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
    payload: Option<Json<AnswersRequest>>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let answers = payload.map(|Json(body)| body.answers).unwrap_or_default();
    let attempt = attempts::submit_attempt(&state, &tenant, &attempt_id, answers).await?;
    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn finalize_attempt(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = grading::finalize_attempt(&state, &tenant, &attempt_id).await?;
    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn review_attempt(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptReview>, ApiError> {
    Ok(Json(attempts::review_attempt(&state, &tenant, &attempt_id).await?))
}

async fn attempt_summary(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptSummary>, ApiError> {
    Ok(Json(attempts::attempt_summary(&state, &tenant, &attempt_id).await?))
}

async fn grade_response(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path((attempt_id, question_id)): Path<(String, String)>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<GradeResult>, ApiError> {
    let result =
        grading::manual_grade(&state, &tenant, &attempt_id, &question_id, payload).await?;
    Ok(Json(result))
}

async fn suggest_score(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path((attempt_id, question_id)): Path<(String, String)>,
) -> Result<Json<SuggestionResult>, ApiError> {
    let suggestion =
        grading::suggest_essay_score(&state, &tenant, &attempt_id, &question_id).await?;
    Ok(Json(suggestion))
}
