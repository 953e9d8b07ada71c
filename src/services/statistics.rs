//! Read-only analytics over attempts.
//!
//! Final-score aggregates only use finalized attempts. Attempts still waiting
//! for manual grading show up in the pending-review count instead.

use std::collections::{HashMap, HashSet};

use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::core::time::format_primitive;
use crate::db::models::QuizAttempt;
use crate::db::types::{AttemptStatus, QuestionType};
use crate::repositories::{round2, AttemptFilter};
use crate::schemas::statistics::{QuestionStatistics, QuizStatistics, StudentTrend, TrendPoint};
use crate::services::{attempts, quizzes, ServiceResult};

const FULL_CREDIT_EPSILON: f64 = 1e-9;

pub(crate) async fn quiz_statistics(
    state: &AppState,
    tenant: &TenantId,
    quiz_id: &str,
) -> ServiceResult<QuizStatistics> {
    quizzes::get_quiz(state, tenant, quiz_id).await?;
    let filter = AttemptFilter { quiz_id: Some(quiz_id.to_string()), ..AttemptFilter::default() };
    let attempts = attempts::list_current(state, tenant, &filter).await?;

    let count = |status: AttemptStatus| attempts.iter().filter(|a| a.status == status).count();
    let started = attempts.len();
    let in_progress = count(AttemptStatus::InProgress);
    let submitted = count(AttemptStatus::Submitted);
    let graded = count(AttemptStatus::Graded);
    let expired = count(AttemptStatus::Expired);

    let finals: Vec<&QuizAttempt> = attempts.iter().filter(|a| a.finalized_at.is_some()).collect();
    let pending_review =
        attempts.iter().filter(|a| a.status.is_closed() && a.finalized_at.is_none()).count();
    let unique_students =
        attempts.iter().map(|a| a.student_id.as_str()).collect::<HashSet<_>>().len();

    let scores: Vec<f64> = finals.iter().filter_map(|a| a.total_score).collect();
    let percentages: Vec<f64> = finals.iter().filter_map(|a| a.percentage).collect();
    let passed = finals.iter().filter(|a| a.passed == Some(true)).count();

    let questions = question_statistics(state, tenant, &finals).await?;

    Ok(QuizStatistics {
        quiz_id: quiz_id.to_string(),
        started,
        in_progress,
        submitted,
        graded,
        expired,
        pending_review,
        finalized: finals.len(),
        completion_rate: ratio(submitted + graded + expired, started).unwrap_or(0.0),
        unique_students,
        average_score: mean(&scores),
        average_percentage: mean(&percentages),
        pass_rate: ratio(passed, finals.len()),
        highest_score: scores.iter().copied().reduce(f64::max),
        lowest_score: scores.iter().copied().reduce(f64::min),
        questions,
    })
}

struct QuestionTally {
    position: i32,
    question_type: QuestionType,
    respondents: usize,
    fully_correct: usize,
    score_sum: f64,
    scored: usize,
}

/// Difficulty index per question: share of respondents awarded full points.
async fn question_statistics(
    state: &AppState,
    tenant: &TenantId,
    finals: &[&QuizAttempt],
) -> ServiceResult<Vec<QuestionStatistics>> {
    if finals.is_empty() {
        return Ok(Vec::new());
    }

    let attempt_ids: Vec<String> = finals.iter().map(|a| a.id.clone()).collect();
    let responses =
        state.store().list_responses_for_attempts(tenant.as_str(), &attempt_ids).await?;
    let by_id: HashMap<&str, &QuizAttempt> = finals.iter().map(|a| (a.id.as_str(), *a)).collect();

    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, QuestionTally> = HashMap::new();
    for response in &responses {
        let Some(question) = by_id
            .get(response.attempt_id.as_str())
            .and_then(|attempt| attempt.snapshot_question(&response.question_id))
        else {
            continue;
        };

        let tally = tallies.entry(response.question_id.clone()).or_insert_with(|| {
            order.push(response.question_id.clone());
            QuestionTally {
                position: question.position,
                question_type: question.question_type,
                respondents: 0,
                fully_correct: 0,
                score_sum: 0.0,
                scored: 0,
            }
        });

        if let Some(score) = response.awarded_score {
            tally.score_sum += score;
            tally.scored += 1;
        }
        if response.answer.is_none() {
            continue;
        }
        tally.respondents += 1;
        if response
            .awarded_score
            .is_some_and(|score| score + FULL_CREDIT_EPSILON >= question.points)
        {
            tally.fully_correct += 1;
        }
    }

    let mut stats: Vec<QuestionStatistics> = order
        .into_iter()
        .filter_map(|question_id| {
            let tally = tallies.remove(&question_id)?;
            Some(QuestionStatistics {
                question_id,
                position: tally.position,
                question_type: tally.question_type,
                respondents: tally.respondents,
                fully_correct: tally.fully_correct,
                difficulty_index: ratio(tally.fully_correct, tally.respondents),
                average_score: (tally.scored > 0)
                    .then(|| round2(tally.score_sum / tally.scored as f64)),
            })
        })
        .collect();
    stats.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.question_id.cmp(&b.question_id)));
    Ok(stats)
}

/// Finalized attempts of one student across quizzes, oldest first.
pub(crate) async fn student_trend(
    state: &AppState,
    tenant: &TenantId,
    student_id: &str,
) -> ServiceResult<StudentTrend> {
    let filter =
        AttemptFilter { student_id: Some(student_id.to_string()), ..AttemptFilter::default() };
    let mut attempts: Vec<QuizAttempt> = attempts::list_current(state, tenant, &filter)
        .await?
        .into_iter()
        .filter(|attempt| attempt.finalized_at.is_some())
        .collect();
    attempts.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));

    let points: Vec<TrendPoint> = attempts
        .into_iter()
        .map(|attempt| TrendPoint {
            attempt_id: attempt.id,
            quiz_id: attempt.quiz_id,
            attempt_number: attempt.attempt_number,
            started_at: format_primitive(attempt.started_at),
            total_score: attempt.total_score.unwrap_or_default(),
            max_score: attempt.max_score,
            percentage: attempt.percentage.unwrap_or_default(),
            passed: attempt.passed.unwrap_or(false),
        })
        .collect();

    let percentages: Vec<f64> = points.iter().map(|point| point.percentage).collect();
    let first_percentage = percentages.first().copied();
    let latest_percentage = percentages.last().copied();
    let delta = first_percentage.zip(latest_percentage).map(|(first, last)| round2(last - first));

    Ok(StudentTrend {
        student_id: student_id.to_string(),
        average_percentage: mean(&percentages),
        first_percentage,
        latest_percentage,
        delta,
        points,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(round2(values.iter().sum::<f64>() / values.len() as f64))
    }
}

/// Fraction rounded to four decimals; `None` for an empty denominator.
fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    let value = numerator as f64 / denominator as f64;
    Some((value * 10_000.0).round() / 10_000.0)
}
