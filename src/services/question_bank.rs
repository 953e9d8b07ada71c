use std::collections::BTreeMap;

use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::db::answers::AnswerKey;
use crate::db::models::{Question, Tag};
use crate::db::types::{DifficultyLevel, LifecycleStatus, QuestionType};
use crate::repositories::{Page, QuestionFilter};
use crate::schemas::question::{
    BulkImportReport, ImportRowError, QuestionBankStatistics, QuestionCreate, QuestionDuplicate,
    QuestionSearchParams, QuestionUpdate, TagCreate,
};
use crate::services::errors::AssessmentError;
use crate::services::ServiceResult;

pub(crate) const MAX_PAGE_LIMIT: i64 = 1000;

pub(crate) async fn create_question(
    state: &AppState,
    tenant: &TenantId,
    payload: QuestionCreate,
) -> ServiceResult<Question> {
    let question = build_question(state, tenant, payload).await?;
    state.store().insert_question(&question).await?;

    tracing::info!(
        tenant = %tenant,
        question_id = %question.id,
        question_type = question.question_type.as_str(),
        "Question created"
    );
    Ok(question)
}

async fn build_question(
    state: &AppState,
    tenant: &TenantId,
    payload: QuestionCreate,
) -> ServiceResult<Question> {
    payload.validate()?;
    let question_type = resolve_type(payload.question_type, &payload.answer_key)?;
    let tag_ids = resolve_tags(state, tenant, &payload.tag_ids).await?;
    let now = state.clock().now();

    Ok(Question {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.as_str().to_string(),
        question_type,
        subject: payload.subject.trim().to_string(),
        class_ref: payload.class_ref,
        prompt: payload.prompt,
        difficulty: payload.difficulty,
        points: payload.points,
        answer_key: Json(payload.answer_key),
        tag_ids: Json(tag_ids),
        explanation: payload.explanation,
        status: LifecycleStatus::Active,
        created_at: now,
        updated_at: now,
    })
}

fn resolve_type(declared: Option<QuestionType>, key: &AnswerKey) -> ServiceResult<QuestionType> {
    let question_type = declared.unwrap_or_else(|| key.question_type());
    key.validate_for(question_type)?;
    Ok(question_type)
}

/// Deduplicates tag ids and checks each one names a live tag of the tenant.
async fn resolve_tags(
    state: &AppState,
    tenant: &TenantId,
    tag_ids: &[String],
) -> ServiceResult<Vec<String>> {
    let mut resolved: Vec<String> = Vec::with_capacity(tag_ids.len());
    for tag_id in tag_ids {
        if resolved.contains(tag_id) {
            continue;
        }
        if state.store().find_tag(tenant.as_str(), tag_id).await?.is_none() {
            return Err(AssessmentError::validation(format!("unknown tag {tag_id}")));
        }
        resolved.push(tag_id.clone());
    }
    Ok(resolved)
}

pub(crate) async fn get_question(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
) -> ServiceResult<Question> {
    state
        .store()
        .find_question(tenant.as_str(), question_id)
        .await?
        .ok_or_else(|| AssessmentError::not_found("question", question_id))
}

/// Edits only reach attempts started afterwards; running attempts keep their snapshot.
pub(crate) async fn update_question(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
    payload: QuestionUpdate,
) -> ServiceResult<Question> {
    payload.validate()?;
    let mut question = get_question(state, tenant, question_id).await?;

    if payload.question_type.is_some() || payload.answer_key.is_some() {
        let declared = payload
            .question_type
            .or(payload.answer_key.as_ref().map(AnswerKey::question_type))
            .unwrap_or(question.question_type);
        let key = payload.answer_key.unwrap_or_else(|| question.answer_key.0.clone());
        question.question_type = resolve_type(Some(declared), &key)?;
        question.answer_key = Json(key);
    }
    if let Some(subject) = payload.subject {
        question.subject = subject.trim().to_string();
    }
    if let Some(class_ref) = payload.class_ref {
        question.class_ref = Some(class_ref);
    }
    if let Some(prompt) = payload.prompt {
        question.prompt = prompt;
    }
    if let Some(difficulty) = payload.difficulty {
        question.difficulty = difficulty;
    }
    if let Some(points) = payload.points {
        question.points = points;
    }
    if let Some(explanation) = payload.explanation {
        question.explanation = Some(explanation);
    }
    question.updated_at = state.clock().now();

    save_question(state, &question).await?;
    tracing::info!(tenant = %tenant, question_id, "Question updated");
    Ok(question)
}

async fn save_question(state: &AppState, question: &Question) -> ServiceResult<()> {
    if state.store().update_question(question).await? {
        Ok(())
    } else {
        Err(AssessmentError::not_found("question", question.id.clone()))
    }
}

pub(crate) async fn delete_question(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
) -> ServiceResult<()> {
    let mut question = get_question(state, tenant, question_id).await?;
    question.status = LifecycleStatus::Deleted;
    question.updated_at = state.clock().now();
    save_question(state, &question).await?;

    tracing::info!(tenant = %tenant, question_id, "Question deleted");
    Ok(())
}

pub(crate) async fn attach_tags(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
    tag_ids: &[String],
) -> ServiceResult<Question> {
    let mut question = get_question(state, tenant, question_id).await?;
    let added = resolve_tags(state, tenant, tag_ids).await?;

    let mut changed = false;
    for tag_id in added {
        if !question.tag_ids.contains(&tag_id) {
            question.tag_ids.0.push(tag_id);
            changed = true;
        }
    }
    if changed {
        question.updated_at = state.clock().now();
        save_question(state, &question).await?;
    }
    Ok(question)
}

pub(crate) async fn detach_tag(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
    tag_id: &str,
) -> ServiceResult<Question> {
    let mut question = get_question(state, tenant, question_id).await?;
    let before = question.tag_ids.len();
    question.tag_ids.0.retain(|existing| existing != tag_id);
    if question.tag_ids.len() == before {
        return Err(AssessmentError::not_found("tag", tag_id));
    }
    question.updated_at = state.clock().now();
    save_question(state, &question).await?;
    Ok(question)
}

/// Copies content under a fresh id in the same tenant.
pub(crate) async fn duplicate_question(
    state: &AppState,
    tenant: &TenantId,
    question_id: &str,
    overrides: QuestionDuplicate,
) -> ServiceResult<Question> {
    overrides.validate()?;
    let source = get_question(state, tenant, question_id).await?;
    let now = state.clock().now();

    let copy = Question {
        id: Uuid::new_v4().to_string(),
        prompt: overrides.prompt.unwrap_or_else(|| source.prompt.clone()),
        difficulty: overrides.difficulty.unwrap_or(source.difficulty),
        points: overrides.points.unwrap_or(source.points),
        status: LifecycleStatus::Active,
        created_at: now,
        updated_at: now,
        ..source
    };
    state.store().insert_question(&copy).await?;

    tracing::info!(
        tenant = %tenant,
        source_id = question_id,
        question_id = %copy.id,
        "Question duplicated"
    );
    Ok(copy)
}

/// Imports rows one by one. A bad row is reported and never blocks the others.
pub(crate) async fn bulk_import(
    state: &AppState,
    tenant: &TenantId,
    rows: Vec<serde_json::Value>,
) -> ServiceResult<BulkImportReport> {
    let max_rows = state.settings().assessment().max_bulk_import_rows;
    if rows.len() > max_rows {
        return Err(AssessmentError::validation(format!(
            "bulk import accepts at most {max_rows} rows, got {}",
            rows.len()
        )));
    }

    let total = rows.len();
    let mut errors = Vec::new();
    let mut imported_ids = Vec::new();

    for (index, row) in rows.into_iter().enumerate() {
        let prompt = row.get("prompt").and_then(|value| value.as_str()).map(str::to_string);
        let outcome = match serde_json::from_value::<QuestionCreate>(row) {
            Ok(payload) => import_row(state, tenant, payload).await,
            Err(err) => Err(AssessmentError::validation(format!("malformed row: {err}"))),
        };

        match outcome {
            Ok(question_id) => imported_ids.push(question_id),
            Err(err) => errors.push(import_error(index, prompt, &err)),
        }
    }

    metrics::count_by(metrics::QUESTIONS_IMPORTED, tenant.as_str(), imported_ids.len() as u64);
    tracing::info!(
        tenant = %tenant,
        total,
        successful = imported_ids.len(),
        failed = errors.len(),
        "Bulk question import finished"
    );

    Ok(BulkImportReport {
        total,
        successful: imported_ids.len(),
        failed: errors.len(),
        errors,
        imported_ids,
    })
}

fn import_error(index: usize, prompt: Option<String>, err: &AssessmentError) -> ImportRowError {
    ImportRowError { index, prompt, message: err.report_message() }
}

async fn import_row(
    state: &AppState,
    tenant: &TenantId,
    payload: QuestionCreate,
) -> ServiceResult<String> {
    let question = build_question(state, tenant, payload).await?;
    state.store().insert_question(&question).await?;
    Ok(question.id)
}

pub(crate) async fn search_questions(
    state: &AppState,
    tenant: &TenantId,
    params: QuestionSearchParams,
) -> ServiceResult<(Page<Question>, i64, i64)> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let filter = QuestionFilter {
        subject: non_blank(params.subject),
        question_type: params.question_type,
        difficulty: params.difficulty,
        tag_id: non_blank(params.tag_id),
        keyword: non_blank(params.keyword),
        skip,
        limit,
    };

    let page = state.store().search_questions(tenant.as_str(), &filter).await?;
    Ok((page, skip, limit))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) async fn statistics(
    state: &AppState,
    tenant: &TenantId,
) -> ServiceResult<QuestionBankStatistics> {
    let counts = state.store().count_questions(tenant.as_str()).await?;

    let mut by_type: BTreeMap<String, i64> =
        QuestionType::ALL.iter().map(|kind| (kind.as_str().to_string(), 0)).collect();
    let mut by_difficulty: BTreeMap<String, i64> =
        DifficultyLevel::ALL.iter().map(|level| (level.as_str().to_string(), 0)).collect();
    let mut total_questions = 0;
    let mut auto_gradable_questions = 0;

    for row in counts {
        *by_type.entry(row.question_type.as_str().to_string()).or_default() += row.count;
        *by_difficulty.entry(row.difficulty.as_str().to_string()).or_default() += row.count;
        total_questions += row.count;
        if row.question_type.is_auto_gradable() {
            auto_gradable_questions += row.count;
        }
    }

    Ok(QuestionBankStatistics { total_questions, auto_gradable_questions, by_type, by_difficulty })
}

pub(crate) async fn create_tag(
    state: &AppState,
    tenant: &TenantId,
    payload: TagCreate,
) -> ServiceResult<Tag> {
    payload.validate()?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AssessmentError::validation("tag name must not be blank"));
    }

    let tag = Tag {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.as_str().to_string(),
        name,
        description: payload.description,
        status: LifecycleStatus::Active,
        created_at: state.clock().now(),
    };
    if !state.store().insert_tag(&tag).await? {
        return Err(AssessmentError::validation(format!("tag '{}' already exists", tag.name)));
    }

    tracing::info!(tenant = %tenant, tag_id = %tag.id, "Tag created");
    Ok(tag)
}

pub(crate) async fn list_tags(state: &AppState, tenant: &TenantId) -> ServiceResult<Vec<Tag>> {
    Ok(state.store().list_tags(tenant.as_str()).await?)
}

pub(crate) async fn delete_tag(state: &AppState, tenant: &TenantId, tag_id: &str) -> ServiceResult<()> {
    if !state.store().delete_tag(tenant.as_str(), tag_id).await? {
        return Err(AssessmentError::not_found("tag", tag_id));
    }
    tracing::info!(tenant = %tenant, tag_id, "Tag deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::StoreError;

    #[test]
    fn storage_failures_become_row_errors() {
        let err = AssessmentError::Store(StoreError::Corrupt {
            entity: "question",
            id: "q-9".into(),
            reason: "duplicate key".into(),
        });
        let row = import_error(3, Some("Name the capital".into()), &err);
        assert_eq!(row.index, 3);
        assert_eq!(row.prompt.as_deref(), Some("Name the capital"));
        assert_eq!(row.message, "internal storage error");
    }
}
