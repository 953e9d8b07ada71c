use crate::db::models::Tag;
use crate::db::types::LifecycleStatus;

pub(crate) const COLUMNS: &str = "id, tenant_id, name, description, status, created_at";

/// Relies on the partial unique index over active names.
pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    tag: &Tag,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO tags (id, tenant_id, name, description, status, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         ON CONFLICT DO NOTHING",
    )
    .bind(&tag.id)
    .bind(&tag.tenant_id)
    .bind(&tag.name)
    .bind(&tag.description)
    .bind(tag.status)
    .bind(tag.created_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<Option<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(&format!(
        "SELECT {COLUMNS} FROM tags WHERE tenant_id = $1 AND id = $2 AND status = $3"
    ))
    .bind(tenant)
    .bind(id)
    .bind(LifecycleStatus::Active)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_active(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(&format!(
        "SELECT {COLUMNS} FROM tags WHERE tenant_id = $1 AND status = $2 ORDER BY lower(name)"
    ))
    .bind(tenant)
    .bind(LifecycleStatus::Active)
    .fetch_all(executor)
    .await
}

pub(crate) async fn soft_delete(
    executor: impl sqlx::PgExecutor<'_>,
    tenant: &str,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE tags SET status = $3 WHERE tenant_id = $1 AND id = $2 AND status = $4")
            .bind(tenant)
            .bind(id)
            .bind(LifecycleStatus::Deleted)
            .bind(LifecycleStatus::Active)
            .execute(executor)
            .await?;

    Ok(result.rows_affected() > 0)
}
