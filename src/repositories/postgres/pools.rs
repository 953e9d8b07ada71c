use crate::db::models::{PoolGeneration, QuestionPool};
use crate::db::types::LifecycleStatus;

pub(crate) const COLUMNS: &str = "\
    id, tenant_id, name, description, subject, quotas, required_tag_ids, allow_repeat, status, \
    created_at, updated_at";
pub(crate) const GENERATION_COLUMNS: &str =
    "id, tenant_id, pool_id, quiz_id, seed, requested_total, question_ids, digest, created_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    pool: &QuestionPool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO question_pools (
            id, tenant_id, name, description, subject, quotas, required_tag_ids, allow_repeat,
            status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
    )
    .bind(&pool.id)
    .bind(&pool.tenant_id)
    .bind(&pool.name)
    .bind(&pool.description)
    .bind(&pool.subject)
    .bind(&pool.quotas)
    .bind(&pool.required_tag_ids)
    .bind(pool.allow_repeat)
    .bind(pool.status)
    .bind(pool.created_at)
    .bind(pool.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<QuestionPool>, sqlx::Error> {
    sqlx::query_as::<_, QuestionPool>(&format!(
        "SELECT {COLUMNS} FROM question_pools WHERE tenant_id = $1 AND id = $2 AND status = $3"
    ))
    .bind(tenant)
    .bind(id)
    .bind(LifecycleStatus::Active)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn update_active(
    executor: impl sqlx::PgExecutor<'_>,
    pool: &QuestionPool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE question_pools SET
            name = $3, description = $4, subject = $5, quotas = $6, required_tag_ids = $7,
            allow_repeat = $8, status = $9, updated_at = $10
         WHERE tenant_id = $1 AND id = $2 AND status = $11",
    )
    .bind(&pool.tenant_id)
    .bind(&pool.id)
    .bind(&pool.name)
    .bind(&pool.description)
    .bind(&pool.subject)
    .bind(&pool.quotas)
    .bind(&pool.required_tag_ids)
    .bind(pool.allow_repeat)
    .bind(pool.status)
    .bind(pool.updated_at)
    .bind(LifecycleStatus::Active)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
) -> Result<Vec<QuestionPool>, sqlx::Error> {
    sqlx::query_as::<_, QuestionPool>(&format!(
        "SELECT {COLUMNS} FROM question_pools WHERE tenant_id = $1 AND status = $2 \
         ORDER BY created_at DESC, id"
    ))
    .bind(tenant)
    .bind(LifecycleStatus::Active)
    .fetch_all(executor)
    .await
}

pub(crate) async fn insert_generation(
    executor: impl sqlx::PgExecutor<'_>,
    generation: &PoolGeneration,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pool_generations (
            id, tenant_id, pool_id, quiz_id, seed, requested_total, question_ids, digest,
            created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(&generation.id)
    .bind(&generation.tenant_id)
    .bind(&generation.pool_id)
    .bind(&generation.quiz_id)
    .bind(generation.seed)
    .bind(generation.requested_total)
    .bind(&generation.question_ids)
    .bind(&generation.digest)
    .bind(generation.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_generations(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    pool_id: &str,
    quiz_id: Option<&str>,
) -> Result<Vec<PoolGeneration>, sqlx::Error> {
    sqlx::query_as::<_, PoolGeneration>(&format!(
        "SELECT {GENERATION_COLUMNS} FROM pool_generations \
         WHERE tenant_id = $1 AND pool_id = $2 AND ($3::varchar IS NULL OR quiz_id = $3) \
         ORDER BY created_at, id"
    ))
    .bind(tenant)
    .bind(pool_id)
    .bind(quiz_id)
    .fetch_all(executor)
    .await
}
