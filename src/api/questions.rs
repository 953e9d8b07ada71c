use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::pagination::PaginatedResponse;
use crate::api::tenant::TenantContext;
use crate::core::state::AppState;
use crate::schemas::question::{
    BulkImportReport, BulkImportRequest, QuestionBankStatistics, QuestionCreate,
    QuestionDuplicate, QuestionResponse, QuestionSearchParams, QuestionUpdate, TagAttach,
};
use crate::services::errors::AssessmentError;
use crate::services::question_bank;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_questions).post(create_question))
        .route("/statistics", get(statistics))
        .route("/import", post(bulk_import))
        .route("/:question_id", get(get_question).put(update_question).delete(delete_question))
        .route("/:question_id/duplicate", post(duplicate_question))
        .route("/:question_id/tags", post(attach_tags))
        .route("/:question_id/tags/:tag_id", delete(detach_tag))
}

async fn create_question(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    let question = question_bank::create_question(&state, &tenant, payload).await?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from_db(question))))
}

async fn search_questions(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Query(params): Query<QuestionSearchParams>,
) -> Result<Json<PaginatedResponse<QuestionResponse>>, ApiError> {
    let (page, skip, limit) = question_bank::search_questions(&state, &tenant, params).await?;
    Ok(Json(PaginatedResponse {
        items: page.items.into_iter().map(QuestionResponse::from_db).collect(),
        total_count: page.total_count,
        skip,
        limit,
    }))
}

async fn statistics(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
) -> Result<Json<QuestionBankStatistics>, ApiError> {
    Ok(Json(question_bank::statistics(&state, &tenant).await?))
}

async fn bulk_import(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Json(payload): Json<BulkImportRequest>,
) -> Result<Json<BulkImportReport>, ApiError> {
    Ok(Json(question_bank::bulk_import(&state, &tenant, payload.questions).await?))
}

async fn get_question(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(question_id): Path<String>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = question_bank::get_question(&state, &tenant, &question_id).await?;
    Ok(Json(QuestionResponse::from_db(question)))
}

async fn update_question(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(question_id): Path<String>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = question_bank::update_question(&state, &tenant, &question_id, payload).await?;
    Ok(Json(QuestionResponse::from_db(question)))
}

async fn delete_question(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(question_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    question_bank::delete_question(&state, &tenant, &question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn duplicate_question(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(question_id): Path<String>,
    payload: Option<Json<QuestionDuplicate>>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    let overrides = payload.map(|Json(body)| body).unwrap_or_default();
    let question =
        question_bank::duplicate_question(&state, &tenant, &question_id, overrides).await?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from_db(question))))
}

async fn attach_tags(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path(question_id): Path<String>,
    Json(payload): Json<TagAttach>,
) -> Result<Json<QuestionResponse>, ApiError> {
    payload.validate().map_err(AssessmentError::from)?;
    let question =
        question_bank::attach_tags(&state, &tenant, &question_id, &payload.tag_ids).await?;
    Ok(Json(QuestionResponse::from_db(question)))
}

async fn detach_tag(
    State(state): State<AppState>,
    TenantContext(tenant): TenantContext,
    Path((question_id, tag_id)): Path<(String, String)>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = question_bank::detach_tag(&state, &tenant, &question_id, &tag_id).await?;
    Ok(Json(QuestionResponse::from_db(question)))
}
