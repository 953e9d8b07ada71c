use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::answers::AnswerPayload;
use crate::db::models::{QuizAttempt, Response};
use crate::db::types::{AttemptStatus, GradingStatus};
use crate::repositories::{AttemptFilter, ResponseGrade, ScoreTally};

pub(crate) const COLUMNS: &str = "\
    id, tenant_id, quiz_id, student_id, attempt_number, status, started_at, deadline_at, \
    submitted_at, finalized_at, snapshot, max_score, passing_score, grading_policy, total_score, \
    percentage, passed, created_at, updated_at";
pub(crate) const RESPONSE_COLUMNS: &str = "\
    tenant_id, attempt_id, question_id, position, answer, awarded_score, grading_status, \
    grader_id, feedback, graded_at, suggested_score, suggested_feedback";

/// Serialises start calls for one (tenant, quiz, student) until the transaction ends.
pub(crate) async fn acquire_pair_lock(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    quiz_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    let key = format!("attempt:{tenant}:{quiz_id}:{student_id}");
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_active_for_pair(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    quiz_id: &str,
    student_id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts \
         WHERE tenant_id = $1 AND quiz_id = $2 AND student_id = $3 AND status = $4"
    ))
    .bind(tenant)
    .bind(quiz_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_for_pair(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    quiz_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts \
         WHERE tenant_id = $1 AND quiz_id = $2 AND student_id = $3",
    )
    .bind(tenant)
    .bind(quiz_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &QuizAttempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO quiz_attempts (
            id, tenant_id, quiz_id, student_id, attempt_number, status, started_at,
            deadline_at, snapshot, max_score, passing_score, grading_policy, created_at,
            updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
        ON CONFLICT DO NOTHING",
    )
    .bind(&attempt.id)
    .bind(&attempt.tenant_id)
    .bind(&attempt.quiz_id)
    .bind(&attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(attempt.status)
    .bind(attempt.started_at)
    .bind(attempt.deadline_at)
    .bind(&attempt.snapshot)
    .bind(attempt.max_score)
    .bind(attempt.passing_score)
    .bind(attempt.grading_policy)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_responses(
    executor: impl sqlx::PgExecutor<'_>,
    responses: &[Response],
) -> Result<(), sqlx::Error> {
    if responses.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO attempt_responses (tenant_id, attempt_id, question_id, position, answer, \
         awarded_score, grading_status) ",
    );
    builder.push_values(responses, |mut row, response| {
        row.push_bind(response.tenant_id.clone())
            .push_bind(response.attempt_id.clone())
            .push_bind(response.question_id.clone())
            .push_bind(response.position)
            .push_bind(response.answer.clone())
            .push_bind(response.awarded_score)
            .push_bind(response.grading_status);
    });
    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(tenant)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    filter: &AttemptFilter,
) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM quiz_attempts WHERE tenant_id = "
    ));
    builder.push_bind(tenant.to_string());

    if let Some(quiz_id) = &filter.quiz_id {
        builder.push(" AND quiz_id = ");
        builder.push_bind(quiz_id.clone());
    }
    if let Some(student_id) = &filter.student_id {
        builder.push(" AND student_id = ");
        builder.push_bind(student_id.clone());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY started_at, id");

    builder.build_query_as::<QuizAttempt>().fetch_all(executor).await
}

pub(crate) async fn list_overdue(
    executor: impl sqlx::PgExecutor<'_>,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts \
         WHERE status = $1 AND deadline_at IS NOT NULL AND deadline_at <= $2 \
         ORDER BY deadline_at LIMIT $3"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(limit.max(0))
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_responses(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_id: &str,
) -> Result<Vec<Response>, sqlx::Error> {
    sqlx::query_as::<_, Response>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM attempt_responses \
         WHERE tenant_id = $1 AND attempt_id = $2 ORDER BY position"
    ))
    .bind(tenant)
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_responses_for_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_ids: &[String],
) -> Result<Vec<Response>, sqlx::Error> {
    sqlx::query_as::<_, Response>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM attempt_responses \
         WHERE tenant_id = $1 AND attempt_id = ANY($2) ORDER BY attempt_id, position"
    ))
    .bind(tenant)
    .bind(attempt_ids)
    .fetch_all(executor)
    .await
}

pub(crate) async fn touch_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
    at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE quiz_attempts SET updated_at = $3 \
         WHERE tenant_id = $1 AND id = $2 AND status = $4",
    )
    .bind(tenant)
    .bind(id)
    .bind(at)
    .bind(AttemptStatus::InProgress)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn save_answer(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_id: &str,
    question_id: &str,
    answer: &AnswerPayload,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempt_responses SET answer = $4 \
         WHERE tenant_id = $1 AND attempt_id = $2 AND question_id = $3",
    )
    .bind(tenant)
    .bind(attempt_id)
    .bind(question_id)
    .bind(Json(answer))
    .execute(executor)
    .await?;
    Ok(())
}

/// Compare-and-set out of IN_PROGRESS.
pub(crate) async fn close(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
    status: AttemptStatus,
    at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let submitted_at = (status == AttemptStatus::Submitted).then_some(at);
    let result = sqlx::query(
        "UPDATE quiz_attempts SET status = $3, submitted_at = $4, updated_at = $5 \
         WHERE tenant_id = $1 AND id = $2 AND status = $6",
    )
    .bind(tenant)
    .bind(id)
    .bind(status)
    .bind(submitted_at)
    .bind(at)
    .bind(AttemptStatus::InProgress)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn write_closing_response(
    executor: impl sqlx::PgExecutor<'_>,
    response: &Response,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempt_responses SET answer = $4, awarded_score = $5, grading_status = $6, \
         graded_at = $7 \
         WHERE tenant_id = $1 AND attempt_id = $2 AND question_id = $3",
    )
    .bind(&response.tenant_id)
    .bind(&response.attempt_id)
    .bind(&response.question_id)
    .bind(&response.answer)
    .bind(response.awarded_score)
    .bind(response.grading_status)
    .bind(response.graded_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_response_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_id: &str,
    question_id: &str,
) -> Result<Option<Response>, sqlx::Error> {
    sqlx::query_as::<_, Response>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM attempt_responses \
         WHERE tenant_id = $1 AND attempt_id = $2 AND question_id = $3 FOR UPDATE"
    ))
    .bind(tenant)
    .bind(attempt_id)
    .bind(question_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn write_manual_grade(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_id: &str,
    question_id: &str,
    grade: &ResponseGrade,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempt_responses SET awarded_score = $4, feedback = $5, grader_id = $6, \
         grading_status = $7, graded_at = $8 \
         WHERE tenant_id = $1 AND attempt_id = $2 AND question_id = $3",
    )
    .bind(tenant)
    .bind(attempt_id)
    .bind(question_id)
    .bind(grade.score)
    .bind(&grade.feedback)
    .bind(&grade.grader_id)
    .bind(GradingStatus::ManuallyGraded)
    .bind(grade.at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn write_suggestion(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    attempt_id: &str,
    question_id: &str,
    score: f64,
    feedback: Option<String>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempt_responses SET suggested_score = $4, suggested_feedback = $5 \
         WHERE tenant_id = $1 AND attempt_id = $2 AND question_id = $3",
    )
    .bind(tenant)
    .bind(attempt_id)
    .bind(question_id)
    .bind(score)
    .bind(feedback)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn write_final_scores(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
    status: AttemptStatus,
    result: &ScoreTally,
    at: PrimitiveDateTime,
) -> Result<QuizAttempt, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts SET status = $3, finalized_at = COALESCE(finalized_at, $4), \
         total_score = $5, percentage = $6, passed = $7, updated_at = $4 \
         WHERE tenant_id = $1 AND id = $2 \
         RETURNING {COLUMNS}"
    ))
    .bind(tenant)
    .bind(id)
    .bind(status)
    .bind(at)
    .bind(result.total)
    .bind(result.percentage)
    .bind(result.passed)
    .fetch_one(executor)
    .await
}
