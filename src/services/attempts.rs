//! Attempt lifecycle: start, auto-save, submit, expiry.
//!
//! Leaving IN_PROGRESS always goes through [`close_attempt`], a compare-and-set
//! in the store. Whichever of submit or expiry gets there first wins; the other
//! caller sees `InvalidStateTransition` (submit) or a no-op (sweep).

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sqlx::types::Json;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::core::time::format_primitive;
use crate::db::answers::AnswerPayload;
use crate::db::models::{Quiz, QuizAttempt, Response, SnapshotQuestion};
use crate::db::types::{AttemptStatus, GradingStatus, QuizStatus};
use crate::repositories::{
    round2, AttemptCreation, AttemptFilter, CloseAttempt, NewAttempt,
};
use crate::schemas::attempt::{
    AnswerEntry, AttemptListParams, AttemptReview, AttemptSummary, ReviewItem,
};
use crate::services::errors::AssessmentError;
use crate::services::{grading, quizzes, scoring, ServiceResult};

pub(crate) async fn start_attempt(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
    student_id: &str,
) -> ServiceResult<QuizAttempt> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(AssessmentError::validation("student_id must not be blank"));
    }

    let quiz = quizzes::get_quiz(state, tenant, quiz_id).await?;
    if quiz.status != QuizStatus::Published {
        return Err(AssessmentError::invalid_transition(format!(
            "quiz is {} and does not accept new attempts",
            quiz.status.as_str()
        )));
    }

    let now = state.clock().now();
    if !quiz.is_open_at(now) {
        return Err(AssessmentError::invalid_transition(availability_message(&quiz, now)));
    }

    expire_stale_for_pair(state, tenant, quiz_id, student_id).await?;

    let attempt_id = Uuid::new_v4().to_string();
    let question_ids = attempt_questions(&quiz, rand::random());
    let snapshot = capture_snapshot(state, tenant, &question_ids).await?;
    let max_score = round2(snapshot.iter().map(|item| item.points).sum());

    let responses = snapshot
        .iter()
        .map(|item| Response {
            tenant_id: tenant.as_str().to_string(),
            attempt_id: attempt_id.clone(),
            question_id: item.question_id.clone(),
            position: item.position,
            answer: None,
            awarded_score: None,
            grading_status: GradingStatus::Pending,
            grader_id: None,
            feedback: None,
            graded_at: None,
            suggested_score: None,
            suggested_feedback: None,
        })
        .collect();

    let attempt = QuizAttempt {
        id: attempt_id,
        tenant_id: tenant.as_str().to_string(),
        quiz_id: quiz.id.clone(),
        student_id: student_id.to_string(),
        attempt_number: 0,
        status: AttemptStatus::InProgress,
        started_at: now,
        deadline_at: quiz.time_limit_seconds.map(|seconds| now + Duration::seconds(seconds)),
        submitted_at: None,
        finalized_at: None,
        snapshot: Json(snapshot),
        max_score,
        passing_score: quiz.passing_score,
        grading_policy: quiz.grading_policy,
        total_score: None,
        percentage: None,
        passed: None,
        created_at: now,
        updated_at: now,
    };

    let created = state
        .store()
        .create_attempt(NewAttempt { attempt, responses, max_attempts: quiz.max_attempts })
        .await?;

    match created {
        AttemptCreation::Created(attempt) => {
            metrics::count(metrics::ATTEMPTS_STARTED, tenant.as_str());
            tracing::info!(
                tenant = %tenant,
                quiz_id,
                attempt_id = %attempt.id,
                student_id,
                attempt_number = attempt.attempt_number,
                "Attempt started"
            );
            Ok(attempt)
        }
        AttemptCreation::ActiveExists => Err(AssessmentError::ConcurrentAttemptConflict),
        AttemptCreation::LimitReached => {
            Err(AssessmentError::AttemptLimitExceeded { max_attempts: quiz.max_attempts })
        }
    }
}

fn availability_message(quiz: &Quiz, now: PrimitiveDateTime) -> String {
    match (quiz.available_from, quiz.available_until) {
        (Some(from), _) if now < from => {
            format!("quiz opens at {}", format_primitive(from))
        }
        (_, Some(until)) => format!("quiz closed at {}", format_primitive(until)),
        _ => "quiz is not available".to_string(),
    }
}

/// The questions one attempt sees, in its order. Shuffled per attempt when the
/// quiz asks for it, then cut to `questions_to_show`.
fn attempt_questions(quiz: &Quiz, seed: u64) -> Vec<String> {
    let mut question_ids = quiz.question_ids.0.clone();
    if quiz.randomize_questions {
        question_ids.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    if let Some(count) = quiz.questions_to_show {
        question_ids.truncate(usize::try_from(count).unwrap_or(0));
    }
    question_ids
}

/// An overdue open attempt must not block a new start.
async fn expire_stale_for_pair(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
    student_id: &str,
) -> ServiceResult<()> {
    let filter = AttemptFilter {
        quiz_id: Some(quiz_id.to_string()),
        student_id: Some(student_id.to_string()),
        status: Some(AttemptStatus::InProgress),
    };
    let open = state.store().list_attempts(tenant.as_str(), &filter).await?;
    expire_listed(state, &open).await?;
    Ok(())
}

/// Freezes the live questions, in quiz order, as the attempt will see them.
async fn capture_snapshot(
    state: &AppState,
    tenant: &TenantId,
    question_ids: &[String],
) -> ServiceResult<Vec<SnapshotQuestion>> {
    let mut live: HashMap<String, _> = state
        .store()
        .find_questions(tenant.as_str(), question_ids)
        .await?
        .into_iter()
        .map(|question| (question.id.clone(), question))
        .collect();

    question_ids
        .iter()
        .enumerate()
        .map(|(position, question_id)| -> ServiceResult<SnapshotQuestion> {
            let question = live.remove(question_id).ok_or_else(|| {
                AssessmentError::validation(format!(
                    "question {question_id} is no longer available"
                ))
            })?;
            Ok(SnapshotQuestion {
                question_id: question.id,
                position: position as i32,
                question_type: question.question_type,
                prompt: question.prompt,
                answer_key: question.answer_key.0,
                points: question.points,
                explanation: question.explanation,
            })
        })
        .collect()
}

pub(crate) async fn load_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<QuizAttempt> {
    state
        .store()
        .find_attempt(tenant.as_str(), attempt_id)
        .await?
        .ok_or_else(|| AssessmentError::not_found("attempt", attempt_id))
}

/// Reads an attempt, expiring it first when its deadline has passed.
pub(crate) async fn get_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<QuizAttempt> {
    let attempt = load_attempt(state, tenant, attempt_id).await?;
    if attempt.status == AttemptStatus::InProgress && attempt.is_past_deadline(state.clock().now())
    {
        expire_attempt(state, &attempt).await?;
        return load_attempt(state, tenant, attempt_id).await;
    }
    Ok(attempt)
}

pub(crate) async fn list_attempts(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
    params: AttemptListParams,
) -> ServiceResult<Vec<QuizAttempt>> {
    quizzes::get_quiz(state, tenant, quiz_id).await?;
    let filter = AttemptFilter {
        quiz_id: Some(quiz_id.to_string()),
        student_id: params.student_id.filter(|id| !id.trim().is_empty()),
        status: params.status,
    };
    list_current(state, tenant, &filter).await
}

/// Lists attempts, expiring overdue ones first so no reader sees a stale
/// IN_PROGRESS row.
pub(crate) async fn list_current(
    state: &AppState,
    tenant: &TenantId,
    filter: &AttemptFilter,
) -> ServiceResult<Vec<QuizAttempt>> {
    let listed = state.store().list_attempts(tenant.as_str(), filter).await?;
    if !expire_listed(state, &listed).await? {
        return Ok(listed);
    }
    // Expiry may have moved rows out of the requested status.
    Ok(state.store().list_attempts(tenant.as_str(), filter).await?)
}

/// Returns true when any listed attempt was expired.
async fn expire_listed(state: &AppState, listed: &[QuizAttempt]) -> ServiceResult<bool> {
    let now = state.clock().now();
    let mut changed = false;
    for attempt in listed {
        if attempt.status == AttemptStatus::InProgress && attempt.is_past_deadline(now) {
            expire_attempt(state, attempt).await?;
            changed = true;
        }
    }
    Ok(changed)
}

pub(crate) async fn list_responses(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<Vec<Response>> {
    Ok(state.store().list_responses(tenant.as_str(), attempt_id).await?)
}

/// Loads an attempt that still accepts answers.
async fn load_open_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<QuizAttempt> {
    let attempt = load_attempt(state, tenant, attempt_id).await?;
    if attempt.status != AttemptStatus::InProgress {
        return Err(AssessmentError::invalid_transition(format!(
            "attempt is already {}",
            attempt.status.as_str()
        )));
    }
    if attempt.is_past_deadline(state.clock().now()) {
        expire_attempt(state, &attempt).await?;
        return Err(AssessmentError::invalid_transition(
            "the time limit has elapsed and the attempt expired",
        ));
    }
    Ok(attempt)
}

/// Checks submitted answers against the attempt's snapshot.
fn parse_answers(
    attempt: &QuizAttempt,
    entries: Vec<AnswerEntry>,
) -> ServiceResult<Vec<(String, AnswerPayload)>> {
    let mut seen = HashSet::new();
    let mut answers = Vec::with_capacity(entries.len());
    for entry in entries {
        let question = attempt.snapshot_question(&entry.question_id).ok_or_else(|| {
            AssessmentError::validation(format!(
                "question {} is not part of this attempt",
                entry.question_id
            ))
        })?;
        if !seen.insert(entry.question_id.clone()) {
            return Err(AssessmentError::validation(format!(
                "question {} is answered twice",
                entry.question_id
            )));
        }
        scoring::check_answer(&entry.question_id, &question.answer_key, &entry.answer)?;
        answers.push((entry.question_id, entry.answer));
    }
    Ok(answers)
}

/// Auto-save without submitting.
pub(crate) async fn save_answers(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    entries: Vec<AnswerEntry>,
) -> ServiceResult<Vec<Response>> {
    let attempt = load_open_attempt(state, tenant, attempt_id).await?;
    let answers = parse_answers(&attempt, entries)?;

    let saved = state
        .store()
        .save_answers(tenant.as_str(), attempt_id, &answers, state.clock().now())
        .await?;
    if !saved {
        return Err(AssessmentError::invalid_transition("attempt is no longer in progress"));
    }

    tracing::debug!(tenant = %tenant, attempt_id, answers = answers.len(), "Answers saved");
    list_responses(state, tenant, attempt_id).await
}

pub(crate) async fn submit_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
    entries: Vec<AnswerEntry>,
) -> ServiceResult<QuizAttempt> {
    let attempt = load_open_attempt(state, tenant, attempt_id).await?;
    let answers = parse_answers(&attempt, entries)?;

    let now = state.clock().now();
    if !close_attempt(state, &attempt, AttemptStatus::Submitted, answers, now).await? {
        return Err(AssessmentError::invalid_transition("attempt is no longer in progress"));
    }

    metrics::count(metrics::ATTEMPTS_SUBMITTED, tenant.as_str());
    tracing::info!(
        tenant = %tenant,
        attempt_id,
        quiz_id = %attempt.quiz_id,
        student_id = %attempt.student_id,
        "Attempt submitted"
    );

    grading::settle(state, tenant.as_str(), attempt_id).await?;
    load_attempt(state, tenant, attempt_id).await
}

/// Moves an overdue attempt to EXPIRED, grading whatever was recorded.
///
/// Returns false when another writer closed the attempt first.
pub(crate) async fn expire_attempt(state: &AppState, attempt: &QuizAttempt) -> ServiceResult<bool> {
    let now = state.clock().now();
    if !close_attempt(state, attempt, AttemptStatus::Expired, Vec::new(), now).await? {
        return Ok(false);
    }

    metrics::count(metrics::ATTEMPTS_EXPIRED, &attempt.tenant_id);
    tracing::info!(
        tenant = %attempt.tenant_id,
        attempt_id = %attempt.id,
        quiz_id = %attempt.quiz_id,
        student_id = %attempt.student_id,
        "Attempt expired"
    );

    grading::settle(state, &attempt.tenant_id, &attempt.id).await?;
    Ok(true)
}

/// Expires up to `batch_size` overdue attempts across all tenants.
pub(crate) async fn expire_overdue(state: &AppState, batch_size: i64) -> ServiceResult<usize> {
    let now = state.clock().now();
    let overdue = state.store().list_overdue_attempts(now, batch_size).await?;

    let mut expired = 0;
    for attempt in &overdue {
        match expire_attempt(state, attempt).await {
            Ok(true) => expired += 1,
            Ok(false) => {}
            Err(err) => tracing::error!(
                error = %err,
                tenant = %attempt.tenant_id,
                attempt_id = %attempt.id,
                "Failed to expire attempt"
            ),
        }
    }
    Ok(expired)
}

async fn close_attempt(
    state: &AppState,
    attempt: &QuizAttempt,
    status: AttemptStatus,
    answers: Vec<(String, AnswerPayload)>,
    at: PrimitiveDateTime,
) -> ServiceResult<bool> {
    let score = |responses: Vec<Response>| auto_grade(attempt, responses, at);
    let close = CloseAttempt { status, at, answers, score: &score };
    Ok(state.store().close_attempt(&attempt.tenant_id, &attempt.id, close).await?)
}

/// Scores objective responses when the frozen policy allows it.
fn auto_grade(attempt: &QuizAttempt, responses: Vec<Response>, at: PrimitiveDateTime) -> Vec<Response> {
    let auto = attempt.grading_policy.auto_grades();
    responses
        .into_iter()
        .map(|mut response| {
            let score = attempt.snapshot_question(&response.question_id).and_then(|question| {
                if !auto {
                    return None;
                }
                scoring::auto_score(
                    &question.answer_key,
                    question.points,
                    response.answer.as_ref().map(|answer| &answer.0),
                )
            });
            match score {
                Some(score) => {
                    response.awarded_score = Some(score);
                    response.grading_status = GradingStatus::AutoGraded;
                    response.graded_at = Some(at);
                }
                None => {
                    response.awarded_score = None;
                    response.grading_status = GradingStatus::Pending;
                }
            }
            response
        })
        .collect()
}

/// Answer keys and explanations are only revealed once the attempt is final.
pub(crate) async fn review_attempt(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<AttemptReview> {
    let attempt = get_attempt(state, tenant, attempt_id).await?;
    let responses = list_responses(state, tenant, attempt_id).await?;
    let finalized = attempt.finalized_at.is_some();

    let items = attempt
        .snapshot
        .iter()
        .map(|question| {
            let response = responses.iter().find(|r| r.question_id == question.question_id);
            ReviewItem {
                question_id: question.question_id.clone(),
                position: question.position,
                question_type: question.question_type,
                prompt: question.prompt.clone(),
                points: question.points,
                answer: response.and_then(|r| r.answer.as_ref().map(|answer| answer.0.clone())),
                awarded_score: response.and_then(|r| r.awarded_score),
                grading_status: response.map_or(GradingStatus::Pending, |r| r.grading_status),
                feedback: response.and_then(|r| r.feedback.clone()),
                answer_key: finalized.then(|| question.answer_key.clone()),
                explanation: if finalized { question.explanation.clone() } else { None },
            }
        })
        .collect();

    Ok(AttemptReview {
        attempt_id: attempt.id,
        quiz_id: attempt.quiz_id,
        student_id: attempt.student_id,
        status: attempt.status,
        finalized,
        total_score: attempt.total_score,
        max_score: attempt.max_score,
        percentage: attempt.percentage,
        passed: attempt.passed,
        items,
    })
}

pub(crate) async fn attempt_summary(
    state: &AppState,
    tenant: &TenantId,
    attempt_id: &str,
) -> ServiceResult<AttemptSummary> {
    let attempt = get_attempt(state, tenant, attempt_id).await?;
    let responses = list_responses(state, tenant, attempt_id).await?;

    let graded_responses = responses.iter().filter(|r| r.grading_status.is_scored()).count();
    let answered_questions = responses.iter().filter(|r| r.answer.is_some()).count();
    let total_score = attempt
        .total_score
        .unwrap_or_else(|| round2(responses.iter().filter_map(|r| r.awarded_score).sum()));
    let percentage = attempt.percentage.unwrap_or_else(|| {
        if attempt.max_score > 0.0 {
            round2(total_score / attempt.max_score * 100.0)
        } else {
            0.0
        }
    });

    Ok(AttemptSummary {
        attempt_id: attempt.id,
        status: attempt.status,
        finalized: attempt.finalized_at.is_some(),
        total_score,
        max_score: attempt.max_score,
        percentage,
        passed: attempt.passed,
        graded_responses,
        pending_responses: responses.len() - graded_responses,
        answered_questions,
        total_questions: attempt.snapshot.len(),
    })
}
