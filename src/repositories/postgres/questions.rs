use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use crate::db::models::Question;
use crate::db::types::{DifficultyLevel, LifecycleStatus, QuestionType};
use crate::repositories::QuestionFilter;

pub(crate) const COLUMNS: &str = "\
    id, tenant_id, question_type, subject, class_ref, prompt, difficulty, points, answer_key, \
    tag_ids, explanation, status, created_at, updated_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    question: &Question,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO questions (
            id, tenant_id, question_type, subject, class_ref, prompt, difficulty, points,
            answer_key, tag_ids, explanation, status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
    )
    .bind(&question.id)
    .bind(&question.tenant_id)
    .bind(question.question_type)
    .bind(&question.subject)
    .bind(&question.class_ref)
    .bind(&question.prompt)
    .bind(question.difficulty)
    .bind(question.points)
    .bind(&question.answer_key)
    .bind(&question.tag_ids)
    .bind(&question.explanation)
    .bind(question.status)
    .bind(question.created_at)
    .bind(question.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE tenant_id = $1 AND id = $2 AND status = $3"
    ))
    .bind(tenant)
    .bind(id)
    .bind(LifecycleStatus::Active)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_many_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    ids: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions \
         WHERE tenant_id = $1 AND id = ANY($2) AND status = $3"
    ))
    .bind(tenant)
    .bind(ids)
    .bind(LifecycleStatus::Active)
    .fetch_all(executor)
    .await
}

pub(crate) async fn update_active(
    executor: impl sqlx::PgExecutor<'_>,
    question: &Question,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE questions SET
            question_type = $3, subject = $4, class_ref = $5, prompt = $6, difficulty = $7,
            points = $8, answer_key = $9, tag_ids = $10, explanation = $11, status = $12,
            updated_at = $13
         WHERE tenant_id = $1 AND id = $2 AND status = $14",
    )
    .bind(&question.tenant_id)
    .bind(&question.id)
    .bind(question.question_type)
    .bind(&question.subject)
    .bind(&question.class_ref)
    .bind(&question.prompt)
    .bind(question.difficulty)
    .bind(question.points)
    .bind(&question.answer_key)
    .bind(&question.tag_ids)
    .bind(&question.explanation)
    .bind(question.status)
    .bind(question.updated_at)
    .bind(LifecycleStatus::Active)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, tenant: &str, filter: &QuestionFilter) {
    builder.push(" WHERE tenant_id = ");
    builder.push_bind(tenant.to_string());
    builder.push(" AND status = ");
    builder.push_bind(LifecycleStatus::Active);

    if let Some(subject) = &filter.subject {
        builder.push(" AND subject = ");
        builder.push_bind(subject.clone());
    }
    if let Some(question_type) = filter.question_type {
        builder.push(" AND question_type = ");
        builder.push_bind(question_type);
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }
    if let Some(tag_id) = &filter.tag_id {
        builder.push(" AND tag_ids @> ");
        builder.push_bind(Json(vec![tag_id.clone()]));
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = format!("%{}%", escape_like(keyword));
        builder.push(" AND (prompt ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR subject ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) async fn search(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    filter: &QuestionFilter,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions"));
    push_filters(&mut builder, tenant, filter);
    builder.push(" ORDER BY created_at DESC, id OFFSET ");
    builder.push_bind(filter.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.clamp(1, 1000));

    builder.build_query_as::<Question>().fetch_all(executor).await
}

pub(crate) async fn count(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    filter: &QuestionFilter,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions");
    push_filters(&mut builder, tenant, filter);
    builder.build_query_scalar::<i64>().fetch_one(executor).await
}

pub(crate) async fn list_candidates(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    subject: &str,
    required_tags: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions \
         WHERE tenant_id = $1 AND subject = $2 AND status = $3 AND tag_ids @> $4 \
         ORDER BY id"
    ))
    .bind(tenant)
    .bind(subject)
    .bind(LifecycleStatus::Active)
    .bind(Json(required_tags))
    .fetch_all(executor)
    .await
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CountRow {
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) count: i64,
}

pub(crate) async fn count_by_type_and_difficulty(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
) -> Result<Vec<CountRow>, sqlx::Error> {
    sqlx::query_as::<_, CountRow>(
        "SELECT question_type, difficulty, COUNT(*) AS count FROM questions \
         WHERE tenant_id = $1 AND status = $2 \
         GROUP BY question_type, difficulty",
    )
    .bind(tenant)
    .bind(LifecycleStatus::Active)
    .fetch_all(executor)
    .await
}
