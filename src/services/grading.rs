use validator::Validate;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::db::answers::{AnswerKey, AnswerPayload};
use crate::db::models::{QuizAttempt, Response};
use crate::db::types::AttemptStatus;
use crate::repositories::{round2, FinalizeOutcome, GradeWrite, ResponseGrade};
use crate::schemas::attempt::ResponseView;
use crate::schemas::grading::{
    BatchGradeItem, BatchGradeReport, BatchItemOutcome, GradeResult, ItemError,
    ManualGradeRequest, SuggestionResult,
};
use crate::services::attempts;
use crate::services::errors::AssessmentError;
use crate::services::essay_assist::EssayPrompt;
use crate::services::events::AssessmentEvent;
use crate::services::ServiceResult;

/// Re-runs the finalization check. Safe to call any number of times; only the
/// call that actually finalizes the attempt emits `AttemptGraded`.
pub(crate) async fn settle(
    state: &AppState,
    tenant: &str,
    attempt_id: &str,
) -> ServiceResult<FinalizeOutcome> {
    let outcome = state.store().finalize_attempt(tenant, attempt_id, state.clock().now()).await?;

    if let FinalizeOutcome::Finalized { attempt, newly_finalized: true } = &outcome {
        metrics::count(metrics::ATTEMPTS_FINALIZED, tenant);
        tracing::info!(
            tenant,
            attempt_id,
            quiz_id = %attempt.quiz_id,
            status = attempt.status.as_str(),
            total_score = attempt.total_score,
            percentage = attempt.percentage,
            "Attempt finalized"
        );
        state.events().publish(graded_event(attempt));
    }
    Ok(outcome)
}

fn graded_event(attempt: &QuizAttempt) -> AssessmentEvent {
    AssessmentEvent::AttemptGraded {
        tenant_id: attempt.tenant_id.clone(),
        attempt_id: attempt.id.clone(),
        quiz_id: attempt.quiz_id.clone(),
        student_id: attempt.student_id.clone(),
        total_score: attempt.total_score.unwrap_or_default(),
        max_score: attempt.max_score,
        percentage: attempt.percentage.unwrap_or_default(),
        passed: attempt.passed.unwrap_or(false),
    }
}

/// Explicit finalization request.
pub(crate) async fn finalize_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<QuizAttempt> {
    // Runs lazy expiry so an overdue attempt can still be finalized.
    attempts::get_attempt(state, tenant, attempt_id).await?;

    match settle(state, tenant.as_str(), attempt_id).await? {
        FinalizeOutcome::Missing => Err(AssessmentError::not_found("attempt", attempt_id)),
        FinalizeOutcome::NotClosed => {
            Err(AssessmentError::invalid_transition("attempt is still in progress"))
        }
        FinalizeOutcome::Pending(pending) => Err(AssessmentError::GradingIncomplete { pending }),
        FinalizeOutcome::Finalized { attempt, .. } => Ok(attempt),
    }
}

/// Loads a closed attempt and the snapshot points of one of its questions.
async fn gradable_response(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    question_id: &str,
) -> ServiceResult<(QuizAttempt, f64)> {
    let attempt = attempts::get_attempt(state, tenant, attempt_id).await?;
    if !attempt.status.is_closed() {
        return Err(AssessmentError::invalid_transition(
            "responses can only be graded after the attempt is submitted or expired",
        ));
    }
    let points = attempt
        .snapshot_question(question_id)
        .map(|question| question.points)
        .ok_or_else(|| AssessmentError::not_found("response", question_id))?;
    Ok((attempt, points))
}

pub(crate) async fn manual_grade(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    question_id: &str,
    request: ManualGradeRequest,
) -> ServiceResult<GradeResult> {
    request.validate()?;
    let grader_id = request.grader_id.trim().to_string();
    if grader_id.is_empty() {
        return Err(AssessmentError::validation("grader_id must not be blank"));
    }

    let (attempt, points) = gradable_response(state, tenant, attempt_id, question_id).await?;
    if !request.score.is_finite() || request.score < 0.0 || request.score > points {
        return Err(AssessmentError::GradingOutOfRange { score: request.score, max: points });
    }

    let grade = ResponseGrade {
        score: request.score,
        feedback: request.feedback,
        grader_id,
        at: state.clock().now(),
    };
    let written = state
        .store()
        .grade_response(tenant.as_str(), attempt_id, question_id, &grade)
        .await?;

    let (status, finalized, pending) = match written {
        GradeWrite::Missing => return Err(AssessmentError::not_found("response", question_id)),
        GradeWrite::Locked => {
            return Err(AssessmentError::invalid_transition(
                "the attempt is graded and its responses can no longer change",
            ))
        }
        GradeWrite::Unchanged => {
            let pending = pending_count(state, tenant, attempt_id).await?;
            (attempt.status, attempt.finalized_at.is_some(), pending)
        }
        GradeWrite::Applied => {
            metrics::count(metrics::RESPONSES_MANUALLY_GRADED, tenant.as_str());
            tracing::info!(
                tenant = %tenant,
                attempt_id,
                question_id,
                grader_id = %grade.grader_id,
                score = grade.score,
                "Response graded manually"
            );
            match settle(state, tenant.as_str(), attempt_id).await? {
                FinalizeOutcome::Finalized { attempt, .. } => (attempt.status, true, 0),
                FinalizeOutcome::Pending(pending) => (attempt.status, false, pending),
                FinalizeOutcome::Missing => {
                    return Err(AssessmentError::not_found("attempt", attempt_id))
                }
                FinalizeOutcome::NotClosed => {
                    return Err(AssessmentError::invalid_transition("attempt is still in progress"))
                }
            }
        }
    };

    let response = find_response(state, tenant, attempt_id, question_id).await?;
    Ok(GradeResult {
        response: ResponseView::from_db(response),
        attempt_status: status,
        finalized,
        pending_responses: pending,
    })
}

async fn pending_count(state: &AppState, tenant: &TenantId, attempt_id: &str) -> ServiceResult<usize> {
    let responses = attempts::list_responses(state, tenant, attempt_id).await?;
    Ok(responses.iter().filter(|r| !r.grading_status.is_scored()).count())
}

async fn find_response(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    question_id: &str,
) -> ServiceResult<Response> {
    attempts::list_responses(state, tenant, attempt_id)
        .await?
        .into_iter()
        .find(|response| response.question_id == question_id)
        .ok_or_else(|| AssessmentError::not_found("response", question_id))
}

/// Applies each grade on its own; one failing item never undoes another.
pub(crate) async fn batch_grade(
    state: &AppState,
    tenant: &TenantId,
    items: Vec<BatchGradeItem>,
) -> ServiceResult<BatchGradeReport> {
    let max_items = state.settings().assessment().max_batch_grading_items;
    if items.is_empty() {
        return Err(AssessmentError::validation("batch must contain at least one item"));
    }
    if items.len() > max_items {
        return Err(AssessmentError::validation(format!(
            "batch accepts at most {max_items} items, got {}",
            items.len()
        )));
    }

    let total = items.len();
    let mut results = Vec::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
        let request = ManualGradeRequest {
            score: item.score,
            feedback: item.feedback,
            grader_id: item.grader_id,
        };
        let outcome =
            manual_grade(state, tenant, &item.attempt_id, &item.question_id, request).await;

        let (attempt_status, error) = match outcome {
            Ok(result) => (Some(result.attempt_status), None),
            Err(err) => (None, Some(item_error(&err))),
        };
        results.push(BatchItemOutcome {
            index,
            attempt_id: item.attempt_id,
            question_id: item.question_id,
            success: error.is_none(),
            attempt_status,
            error,
        });
    }

    let succeeded = results.iter().filter(|outcome| outcome.success).count();
    tracing::info!(
        tenant = %tenant,
        total,
        succeeded,
        failed = total - succeeded,
        "Batch grading finished"
    );
    Ok(BatchGradeReport { total, succeeded, failed: total - succeeded, results })
}

fn item_error(err: &AssessmentError) -> ItemError {
    ItemError { code: err.kind(), message: err.report_message() }
}

/// Asks the configured assistant for an advisory essay score.
///
/// The suggestion is stored next to the response; the response stays
/// pending until a grader confirms a score.
pub(crate) async fn suggest_essay_score(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    question_id: &str,
) -> ServiceResult<SuggestionResult> {
    let Some(assist) = state.assist() else {
        return Err(AssessmentError::validation("essay assist is not configured"));
    };

    let (attempt, points) = gradable_response(state, tenant, attempt_id, question_id).await?;
    if attempt.status == AttemptStatus::Graded {
        return Err(AssessmentError::invalid_transition(
            "the attempt is graded and no longer takes suggestions",
        ));
    }
    let Some(question) = attempt.snapshot_question(question_id) else {
        return Err(AssessmentError::not_found("response", question_id));
    };
    let AnswerKey::Essay { reference, rubric } = &question.answer_key else {
        return Err(AssessmentError::validation("only essay responses take suggestions"));
    };

    let response = find_response(state, tenant, attempt_id, question_id).await?;
    let answer = match response.answer.as_ref().map(|answer| &answer.0) {
        Some(AnswerPayload::Text(text)) if !text.trim().is_empty() => text.clone(),
        _ => return Err(AssessmentError::validation("there is no essay answer to assess")),
    };

    let prompt = EssayPrompt {
        question: question.prompt.clone(),
        reference: reference.clone(),
        rubric: rubric.clone(),
        answer,
        max_score: points,
    };
    let suggestion = assist.suggest(&prompt).await.map_err(|err| {
        tracing::warn!(error = %err, tenant = %tenant, attempt_id, "Essay assist failed");
        AssessmentError::validation("essay assist could not produce a suggestion")
    })?;
    if !suggestion.score.is_finite() {
        return Err(AssessmentError::validation("essay assist returned an unusable score"));
    }

    let score = round2(suggestion.score.clamp(0.0, points));
    let recorded = state
        .store()
        .record_suggestion(tenant.as_str(), attempt_id, question_id, score, suggestion.feedback.clone())
        .await?;
    if !recorded {
        return Err(AssessmentError::not_found("response", question_id));
    }

    tracing::info!(tenant = %tenant, attempt_id, question_id, score, "Essay suggestion recorded");
    Ok(SuggestionResult {
        question_id: question_id.to_string(),
        suggested_score: score,
        suggested_feedback: suggestion.feedback,
        max_score: points,
    })
}
