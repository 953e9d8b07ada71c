use std::collections::HashSet;

use sqlx::types::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::db::models::{PoolGeneration, Question, Quiz};
use crate::db::types::{GradingPolicy, LifecycleStatus, QuizStatus};
use crate::repositories::{Page, QuizFilter};
use crate::schemas::quiz::{AddFromPoolRequest, QuizCreate, QuizListParams, QuizUpdate};
use crate::services::errors::AssessmentError;
use crate::services::events::AssessmentEvent;
use crate::services::question_bank::MAX_PAGE_LIMIT;
use crate::services::{question_pool, ServiceResult};

const CLONE_SUFFIX: &str = " (Copy)";

pub(crate) async fn create_quiz(
    state: &AppState,
    tenant: &TenantId,
    payload: QuizCreate,
) -> ServiceResult<Quiz> {
    payload.validate()?;
    check_window(payload.available_from, payload.available_until)?;
    check_question_list(state, tenant, &payload.question_ids).await?;
    let now = state.clock().now();
    let default_attempts = state.settings().assessment().default_max_attempts;

    let quiz = Quiz {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.as_str().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        subject: payload.subject,
        status: QuizStatus::Draft,
        question_ids: Json(payload.question_ids),
        time_limit_seconds: payload.time_limit_seconds,
        max_attempts: payload
            .max_attempts
            .unwrap_or_else(|| i32::try_from(default_attempts).unwrap_or(i32::MAX)),
        passing_score: payload.passing_score,
        grading_policy: payload.grading_policy,
        available_from: payload.available_from,
        available_until: payload.available_until,
        randomize_questions: payload.randomize_questions,
        questions_to_show: payload.questions_to_show,
        lifecycle: LifecycleStatus::Active,
        cloned_from: None,
        created_at: now,
        updated_at: now,
        published_at: None,
        archived_at: None,
    };
    state.store().insert_quiz(&quiz).await?;

    tracing::info!(tenant = %tenant, quiz_id = %quiz.id, "Quiz created");
    Ok(quiz)
}

fn check_window(
    from: Option<PrimitiveDateTime>,
    until: Option<PrimitiveDateTime>,
) -> ServiceResult<()> {
    match (from, until) {
        (Some(from), Some(until)) if from >= until => Err(AssessmentError::validation(
            "available_from must be earlier than available_until",
        )),
        _ => Ok(()),
    }
}

/// Rejects repeated ids and ids that do not name a live question.
async fn check_question_list(
    state: &AppState,
    tenant: &TenantId,
    question_ids: &[String],
) -> ServiceResult<Vec<Question>> {
    let mut seen = HashSet::new();
    if let Some(repeated) = question_ids.iter().find(|&id| !seen.insert(id)) {
        return Err(AssessmentError::validation(format!("question {repeated} is listed twice")));
    }

    let found = state.store().find_questions(tenant.as_str(), question_ids).await?;
    if let Some(missing) =
        question_ids.iter().find(|id| !found.iter().any(|question| &question.id == *id))
    {
        return Err(AssessmentError::validation(format!("question {missing} does not exist")));
    }
    Ok(found)
}

pub(crate) async fn get_quiz(state: &AppState, tenant: &TenantId, quiz_id: &str) -> ServiceResult<Quiz> {
    state
        .store()
        .find_quiz(tenant.as_str(), quiz_id)
        .await?
        .ok_or_else(|| AssessmentError::not_found("quiz", quiz_id))
}

pub(crate) async fn list_quizzes(
    state: &AppState,
    tenant: &TenantId,
    params: QuizListParams,
) -> ServiceResult<(Page<Quiz>, i64, i64)> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let filter = QuizFilter {
        status: params.status,
        subject: params.subject.filter(|subject| !subject.trim().is_empty()),
        skip,
        limit,
    };
    let page = state.store().list_quizzes(tenant.as_str(), &filter).await?;
    Ok((page, skip, limit))
}

fn require_draft(quiz: &Quiz, action: &str) -> ServiceResult<()> {
    if quiz.status == QuizStatus::Draft {
        Ok(())
    } else {
        Err(AssessmentError::invalid_transition(format!(
            "cannot {action} a {} quiz",
            quiz.status.as_str()
        )))
    }
}

async fn save_draft(state: &AppState, tenant: &TenantId, quiz: &Quiz) -> ServiceResult<()> {
    if state.store().update_draft_quiz(quiz).await? {
        return Ok(());
    }
    // Lost a race with publish or delete.
    let current = get_quiz(state, tenant, &quiz.id).await?;
    require_draft(&current, "edit")?;
    Err(AssessmentError::invalid_transition("quiz changed concurrently"))
}

pub(crate) async fn update_quiz(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
    payload: QuizUpdate,
) -> ServiceResult<Quiz> {
    payload.validate()?;
    let mut quiz = get_quiz(state, tenant, quiz_id).await?;
    require_draft(&quiz, "edit")?;

    if let Some(title) = payload.title {
        quiz.title = title.trim().to_string();
    }
    if let Some(description) = payload.description {
        quiz.description = Some(description);
    }
    if let Some(subject) = payload.subject {
        quiz.subject = Some(subject);
    }
    if let Some(question_ids) = payload.question_ids {
        check_question_list(state, tenant, &question_ids).await?;
        quiz.question_ids = Json(question_ids);
    }
    if payload.clear_time_limit {
        quiz.time_limit_seconds = None;
    } else if let Some(limit) = payload.time_limit_seconds {
        quiz.time_limit_seconds = Some(limit);
    }
    if let Some(max_attempts) = payload.max_attempts {
        quiz.max_attempts = max_attempts;
    }
    if let Some(passing_score) = payload.passing_score {
        quiz.passing_score = passing_score;
    }
    if let Some(policy) = payload.grading_policy {
        quiz.grading_policy = policy;
    }
    if payload.clear_availability {
        quiz.available_from = None;
        quiz.available_until = None;
    } else {
        quiz.available_from = payload.available_from.or(quiz.available_from);
        quiz.available_until = payload.available_until.or(quiz.available_until);
        check_window(quiz.available_from, quiz.available_until)?;
    }
    if let Some(randomize) = payload.randomize_questions {
        quiz.randomize_questions = randomize;
    }
    if payload.show_all_questions {
        quiz.questions_to_show = None;
    } else if let Some(count) = payload.questions_to_show {
        quiz.questions_to_show = Some(count);
    }
    quiz.updated_at = state.clock().now();

    save_draft(state, tenant, &quiz).await?;
    tracing::info!(tenant = %tenant, quiz_id, "Quiz updated");
    Ok(quiz)
}

/// Soft delete. Published quizzes have to be archived first.
pub(crate) async fn delete_quiz(state: &AppState, tenant: &TenantId, quiz_id: &str) -> ServiceResult<()> {
    let quiz = get_quiz(state, tenant, quiz_id).await?;
    if quiz.status == QuizStatus::Published {
        return Err(AssessmentError::invalid_transition(
            "a published quiz must be archived before it can be deleted",
        ));
    }
    if !state.store().delete_quiz(tenant.as_str(), quiz_id, state.clock().now()).await? {
        return Err(AssessmentError::invalid_transition("quiz changed concurrently"));
    }

    tracing::info!(tenant = %tenant, quiz_id, "Quiz deleted");
    Ok(())
}

pub(crate) async fn publish_quiz(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
) -> ServiceResult<Quiz> {
    let quiz = get_quiz(state, tenant, quiz_id).await?;
    require_draft(&quiz, "publish")?;

    if quiz.question_ids.is_empty() {
        return Err(AssessmentError::validation("a quiz needs at least one question to publish"));
    }
    let questions = check_question_list(state, tenant, &quiz.question_ids).await?;
    if let Some(count) = quiz.questions_to_show {
        if count as usize > quiz.question_ids.len() {
            return Err(AssessmentError::validation(format!(
                "questions_to_show is {count} but the quiz has {} questions",
                quiz.question_ids.len()
            )));
        }
    }
    let total_points: f64 = questions.iter().map(|question| question.points).sum();
    if total_points <= 0.0 {
        return Err(AssessmentError::validation("total points must be greater than zero"));
    }
    if quiz.grading_policy == GradingPolicy::AutoOnly {
        if let Some(manual) =
            questions.iter().find(|question| !question.question_type.is_auto_gradable())
        {
            return Err(AssessmentError::PolicyViolation(format!(
                "question {} is {} and cannot be graded automatically under auto_only",
                manual.id,
                manual.question_type.as_str()
            )));
        }
    }

    transition(state, tenant, &quiz, QuizStatus::Published).await?;
    let quiz = get_quiz(state, tenant, quiz_id).await?;

    state.events().publish(AssessmentEvent::QuizPublished {
        tenant_id: tenant.as_str().to_string(),
        quiz_id: quiz.id.clone(),
        title: quiz.title.clone(),
        question_count: quiz.question_ids.len(),
    });
    tracing::info!(
        tenant = %tenant,
        quiz_id,
        questions = quiz.question_ids.len(),
        total_points,
        "Quiz published"
    );
    Ok(quiz)
}

/// Stops new attempts. Existing attempts stay gradable.
pub(crate) async fn archive_quiz(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
) -> ServiceResult<Quiz> {
    let quiz = get_quiz(state, tenant, quiz_id).await?;
    if quiz.status != QuizStatus::Published {
        return Err(AssessmentError::invalid_transition(format!(
            "only published quizzes can be archived, this one is {}",
            quiz.status.as_str()
        )));
    }

    transition(state, tenant, &quiz, QuizStatus::Archived).await?;
    tracing::info!(tenant = %tenant, quiz_id, "Quiz archived");
    get_quiz(state, tenant, quiz_id).await
}

async fn transition(
    state: &AppState,
    tenant: &TenantId,
    quiz: &Quiz,
    to: QuizStatus,
) -> ServiceResult<()> {
    let moved = state
        .store()
        .transition_quiz(tenant.as_str(), &quiz.id, quiz.status, to, state.clock().now())
        .await?;
    if moved {
        Ok(())
    } else {
        Err(AssessmentError::invalid_transition(format!(
            "quiz is no longer {}",
            quiz.status.as_str()
        )))
    }
}

/// Copies a published or archived quiz into a new, independent draft.
pub(crate) async fn clone_quiz(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
) -> ServiceResult<Quiz> {
    let source = get_quiz(state, tenant, quiz_id).await?;
    if source.status == QuizStatus::Draft {
        return Err(AssessmentError::invalid_transition(
            "only published or archived quizzes can be cloned",
        ));
    }
    let now = state.clock().now();

    let copy = Quiz {
        id: Uuid::new_v4().to_string(),
        title: format!("{}{CLONE_SUFFIX}", source.title),
        status: QuizStatus::Draft,
        lifecycle: LifecycleStatus::Active,
        cloned_from: Some(source.id.clone()),
        created_at: now,
        updated_at: now,
        published_at: None,
        archived_at: None,
        ..source
    };
    state.store().insert_quiz(&copy).await?;

    tracing::info!(tenant = %tenant, source_id = quiz_id, quiz_id = %copy.id, "Quiz cloned");
    Ok(copy)
}

/// Draws from a pool paired with this quiz and appends the resolved ids.
pub(crate) async fn add_questions_from_pool(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
    payload: AddFromPoolRequest,
) -> ServiceResult<(Quiz, PoolGeneration)> {
    payload.validate()?;
    let mut quiz = get_quiz(state, tenant, quiz_id).await?;
    require_draft(&quiz, "add questions to")?;

    let generation = question_pool::generate(
        state,
        tenant,
        &payload.pool_id,
        payload.requested_total,
        Some(quiz_id),
    )
    .await?;

    for question_id in generation.question_ids.iter() {
        if !quiz.question_ids.contains(question_id) {
            quiz.question_ids.0.push(question_id.clone());
        }
    }
    quiz.updated_at = state.clock().now();
    save_draft(state, tenant, &quiz).await?;

    tracing::info!(
        tenant = %tenant,
        quiz_id,
        pool_id = %payload.pool_id,
        added = generation.question_ids.len(),
        "Pool questions added to quiz"
    );
    Ok((quiz, generation))
}
