use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Quiz;
use crate::db::types::{LifecycleStatus, QuizStatus};
use crate::repositories::QuizFilter;

pub(crate) const COLUMNS: &str = "\
    id, tenant_id, title, description, subject, status, question_ids, time_limit_seconds, \
    max_attempts, passing_score, grading_policy, available_from, available_until, \
    randomize_questions, questions_to_show, lifecycle, cloned_from, created_at, updated_at, \
    published_at, archived_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    quiz: &Quiz,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO quizzes (
            id, tenant_id, title, description, subject, status, question_ids,
            time_limit_seconds, max_attempts, passing_score, grading_policy, available_from,
            available_until, randomize_questions, questions_to_show, lifecycle,
            cloned_from, created_at, updated_at, published_at, archived_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)",
    )
    .bind(&quiz.id)
    .bind(&quiz.tenant_id)
    .bind(&quiz.title)
    .bind(&quiz.description)
    .bind(&quiz.subject)
    .bind(quiz.status)
    .bind(&quiz.question_ids)
    .bind(quiz.time_limit_seconds)
    .bind(quiz.max_attempts)
    .bind(quiz.passing_score)
    .bind(quiz.grading_policy)
    .bind(quiz.available_from)
    .bind(quiz.available_until)
    .bind(quiz.randomize_questions)
    .bind(quiz.questions_to_show)
    .bind(quiz.lifecycle)
    .bind(&quiz.cloned_from)
    .bind(quiz.created_at)
    .bind(quiz.updated_at)
    .bind(quiz.published_at)
    .bind(quiz.archived_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {COLUMNS} FROM quizzes WHERE tenant_id = $1 AND id = $2 AND lifecycle = $3"
    ))
    .bind(tenant)
    .bind(id)
    .bind(LifecycleStatus::Active)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn update_draft(
    executor: impl sqlx::PgExecutor<'_>,
    quiz: &Quiz,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE quizzes SET
            title = $3, description = $4, subject = $5, question_ids = $6,
            time_limit_seconds = $7, max_attempts = $8, passing_score = $9,
            grading_policy = $10, updated_at = $11, available_from = $14,
            available_until = $15, randomize_questions = $16, questions_to_show = $17
         WHERE tenant_id = $1 AND id = $2 AND status = $12 AND lifecycle = $13",
    )
    .bind(&quiz.tenant_id)
    .bind(&quiz.id)
    .bind(&quiz.title)
    .bind(&quiz.description)
    .bind(&quiz.subject)
    .bind(&quiz.question_ids)
    .bind(quiz.time_limit_seconds)
    .bind(quiz.max_attempts)
    .bind(quiz.passing_score)
    .bind(quiz.grading_policy)
    .bind(quiz.updated_at)
    .bind(QuizStatus::Draft)
    .bind(LifecycleStatus::Active)
    .bind(quiz.available_from)
    .bind(quiz.available_until)
    .bind(quiz.randomize_questions)
    .bind(quiz.questions_to_show)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn transition(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
    from: QuizStatus,
    to: QuizStatus,
    at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE quizzes SET
            status = $4,
            updated_at = $5,
            published_at = CASE WHEN $4 = 'published'::quizstatus THEN $5 ELSE published_at END,
            archived_at = CASE WHEN $4 = 'archived'::quizstatus THEN $5 ELSE archived_at END
         WHERE tenant_id = $1 AND id = $2 AND status = $3 AND lifecycle = $6",
    )
    .bind(tenant)
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(at)
    .bind(LifecycleStatus::Active)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn soft_delete(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
    at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE quizzes SET lifecycle = $3, updated_at = $4
         WHERE tenant_id = $1 AND id = $2 AND lifecycle = $5 AND status <> $6",
    )
    .bind(tenant)
    .bind(id)
    .bind(LifecycleStatus::Deleted)
    .bind(at)
    .bind(LifecycleStatus::Active)
    .bind(QuizStatus::Published)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, tenant: &str, filter: &QuizFilter) {
    builder.push(" WHERE tenant_id = ");
    builder.push_bind(tenant.to_string());
    builder.push(" AND lifecycle = ");
    builder.push_bind(LifecycleStatus::Active);
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(subject) = &filter.subject {
        builder.push(" AND subject = ");
        builder.push_bind(subject.clone());
    }
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    filter: &QuizFilter,
) -> Result<Vec<Quiz>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM quizzes"));
    push_filters(&mut builder, tenant, filter);
    builder.push(" ORDER BY created_at DESC, id OFFSET ");
    builder.push_bind(filter.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.clamp(1, 1000));

    builder.build_query_as::<Quiz>().fetch_all(executor).await
}

pub(crate) async fn count(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    filter: &QuizFilter,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM quizzes");
    push_filters(&mut builder, tenant, filter);
    builder.build_query_scalar::<i64>().fetch_one(executor).await
}
