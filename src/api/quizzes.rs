use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::pagination::PaginatedResponse;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::attempt::{AttemptListParams, AttemptResponse, StartAttemptRequest};
use crate::schemas::pool::GenerationResponse;
use crate::schemas::quiz::{AddFromPoolRequest, QuizCreate, QuizListParams, QuizResponse, QuizUpdate};
use crate::schemas::statistics::QuizStatistics;
use crate::services::errors::AssessmentError;
use crate::services::{attempts, quizzes, statistics};

#[derive(Debug, Serialize)]
struct PoolAdditionResponse {
    quiz: QuizResponse,
    generation: GenerationResponse,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_quizzes).post(create_quiz))
        .route("/:quiz_id", get(get_quiz).patch(update_quiz).delete(delete_quiz))
        .route("/:quiz_id/questions/from-pool", post(add_from_pool))
        .route("/:quiz_id/publish", post(publish_quiz))
        .route("/:quiz_id/archive", post(archive_quiz))
        .route("/:quiz_id/clone", post(clone_quiz))
        .route("/:quiz_id/attempts", get(list_attempts).post(start_attempt))
        .route("/:quiz_id/statistics", get(quiz_statistics))
}

async fn create_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<QuizCreate>,
) -> Result<(StatusCode, Json<QuizResponse>), ApiError> {
    let quiz = quizzes::create_quiz(&state, &tenant, payload).await?;
    Ok((StatusCode::CREATED, Json(QuizResponse::from_db(quiz))))
}

async fn list_quizzes(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Query(params): Query<QuizListParams>,
) -> Result<Json<PaginatedResponse<QuizResponse>>, ApiError> {
    let (page, skip, limit) = quizzes::list_quizzes(&state, &tenant, params).await?;
    Ok(Json(PaginatedResponse {
        items: page.items.into_iter().map(QuizResponse::from_db).collect(),
        total_count: page.total_count,
        skip,
        limit,
    }))
}

async fn get_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizResponse>, ApiError> {
    let quiz = quizzes::get_quiz(&state, &tenant, &quiz_id).await?;
    Ok(Json(QuizResponse::from_db(quiz)))
}

async fn update_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
    Json(payload): Json<QuizUpdate>,
) -> Result<Json<QuizResponse>, ApiError> {
    let quiz = quizzes::update_quiz(&state, &tenant, &quiz_id, payload).await?;
    Ok(Json(QuizResponse::from_db(quiz)))
}

async fn delete_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    quizzes::delete_quiz(&state, &tenant, &quiz_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_from_pool(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
    Json(payload): Json<AddFromPoolRequest>,
) -> Result<Json<PoolAdditionResponse>, ApiError> {
    let (quiz, generation) =
        quizzes::add_questions_from_pool(&state, &tenant, &quiz_id, payload).await?;
    Ok(Json(PoolAdditionResponse {
        quiz: QuizResponse::from_db(quiz),
        generation: GenerationResponse::from_db(generation),
    }))
}

async fn publish_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizResponse>, ApiError> {
    let quiz = quizzes::publish_quiz(&state, &tenant, &quiz_id).await?;
    Ok(Json(QuizResponse::from_db(quiz)))
}

async fn archive_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizResponse>, ApiError> {
    let quiz = quizzes::archive_quiz(&state, &tenant, &quiz_id).await?;
    Ok(Json(QuizResponse::from_db(quiz)))
}

async fn clone_quiz(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<(StatusCode, Json<QuizResponse>), ApiError> {
    let quiz = quizzes::clone_quiz(&state, &tenant, &quiz_id).await?;
    Ok((StatusCode::CREATED, Json(QuizResponse::from_db(quiz))))
}

async fn start_attempt(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    payload.validate().map_err(AssessmentError::from)?;
    let attempt =
        attempts::start_attempt(&state, &tenant, &quiz_id, payload.student_id.trim()).await?;
    Ok((StatusCode::CREATED, Json(AttemptResponse::from_db(attempt))))
}

async fn list_attempts(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
    Query(params): Query<AttemptListParams>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let attempts = attempts::list_attempts(&state, &tenant, &quiz_id, params).await?;
    Ok(Json(attempts.into_iter().map(AttemptResponse::from_db).collect()))
}

async fn quiz_statistics(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizStatistics>, ApiError> {
    Ok(Json(statistics::quiz_statistics(&state, &tenant, &quiz_id).await?))
}
