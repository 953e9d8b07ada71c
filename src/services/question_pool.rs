//! Constrained random draws from the question bank.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::tenant::TenantId;
use crate::db::models::{PoolGeneration, Question, QuestionPool};
use crate::db::types::{DifficultyLevel, LifecycleStatus};
use crate::schemas::pool::{PoolCreate, PoolUpdate};
use crate::services::errors::AssessmentError;
use crate::services::ServiceResult;

/// Bucket name used for pools without per-difficulty quotas.
const ANY_BUCKET: &str = "any";

pub(crate) async fn create_pool(
    state: &AppState,
    tenant: &TenantId,
    payload: PoolCreate,
) -> ServiceResult<QuestionPool> {
    payload.validate()?;
    let required_tag_ids = dedup(payload.required_tag_ids);
    check_tags(state, tenant, &required_tag_ids).await?;
    let now = state.clock().now();

    let pool = QuestionPool {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.as_str().to_string(),
        name: payload.name.trim().to_string(),
        description: payload.description,
        subject: payload.subject.trim().to_string(),
        quotas: Json(payload.quotas),
        required_tag_ids: Json(required_tag_ids),
        allow_repeat: payload.allow_repeat,
        status: LifecycleStatus::Active,
        created_at: now,
        updated_at: now,
    };
    state.store().insert_pool(&pool).await?;

    tracing::info!(tenant = %tenant, pool_id = %pool.id, "Question pool created");
    Ok(pool)
}

pub(crate) async fn get_pool(
    state: &AppState,
    tenant: &TenantId,
    pool_id: &str,
) -> ServiceResult<QuestionPool> {
    state
        .store()
        .find_pool(tenant.as_str(), pool_id)
        .await?
        .ok_or_else(|| AssessmentError::not_found("pool", pool_id))
}

pub(crate) async fn list_pools(state: &AppState, tenant: &TenantId) -> ServiceResult<Vec<QuestionPool>> {
    Ok(state.store().list_pools(tenant.as_str()).await?)
}

pub(crate) async fn update_pool(
    state: &AppState,
    tenant: &TenantId,
    pool_id: &str,
    payload: PoolUpdate,
) -> ServiceResult<QuestionPool> {
    payload.validate()?;
    let mut pool = get_pool(state, tenant, pool_id).await?;

    if let Some(name) = payload.name {
        pool.name = name.trim().to_string();
    }
    if let Some(description) = payload.description {
        pool.description = Some(description);
    }
    if let Some(subject) = payload.subject {
        pool.subject = subject.trim().to_string();
    }
    if let Some(quotas) = payload.quotas {
        pool.quotas = Json(quotas);
    }
    if let Some(tag_ids) = payload.required_tag_ids {
        let tag_ids = dedup(tag_ids);
        check_tags(state, tenant, &tag_ids).await?;
        pool.required_tag_ids = Json(tag_ids);
    }
    if let Some(allow_repeat) = payload.allow_repeat {
        pool.allow_repeat = allow_repeat;
    }
    pool.updated_at = state.clock().now();

    save_pool(state, &pool).await?;
    tracing::info!(tenant = %tenant, pool_id, "Question pool updated");
    Ok(pool)
}

pub(crate) async fn delete_pool(state: &AppState, tenant: &TenantId, pool_id: &str) -> ServiceResult<()> {
    let mut pool = get_pool(state, tenant, pool_id).await?;
    pool.status = LifecycleStatus::Deleted;
    pool.updated_at = state.clock().now();
    save_pool(state, &pool).await?;

    tracing::info!(tenant = %tenant, pool_id, "Question pool deleted");
    Ok(())
}

async fn save_pool(state: &AppState, pool: &QuestionPool) -> ServiceResult<()> {
    if state.store().update_pool(pool).await? {
        Ok(())
    } else {
        Err(AssessmentError::not_found("pool", pool.id.clone()))
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

async fn check_tags(state: &AppState, tenant: &TenantId, tag_ids: &[String]) -> ServiceResult<()> {
    for tag_id in tag_ids {
        if state.store().find_tag(tenant.as_str(), tag_id).await?.is_none() {
            return Err(AssessmentError::validation(format!("unknown tag {tag_id}")));
        }
    }
    Ok(())
}

/// Draws a fixed question set from the pool and records the draw.
///
/// Every bucket is checked before anything is selected, so a short bucket
/// fails the whole draw and leaves no generation record behind.
pub(crate) async fn generate(
    state: &AppState,
    tenant: &TenantId,
    pool_id: &str,
    requested_total: Option<u32>,
    quiz_id: Option<&str>,
) -> ServiceResult<PoolGeneration> {
    let pool = get_pool(state, tenant, pool_id).await?;
    let quotas = effective_quotas(&pool, requested_total)?;
    if let Some(quiz_id) = quiz_id {
        if state.store().find_quiz(tenant.as_str(), quiz_id).await?.is_none() {
            return Err(AssessmentError::not_found("quiz", quiz_id));
        }
    }

    let mut excluded: HashSet<String> = HashSet::new();
    if let Some(quiz_id) = quiz_id.filter(|_| !pool.allow_repeat) {
        let prior =
            state.store().list_generations(tenant.as_str(), pool_id, Some(quiz_id)).await?;
        for generation in prior {
            excluded.extend(generation.question_ids.0);
        }
    }

    let candidates = state
        .store()
        .list_candidates(tenant.as_str(), &pool.subject, &pool.required_tag_ids)
        .await?;
    let buckets = bucket_candidates(candidates, &excluded, &quotas);

    for (bucket, wanted) in &quotas {
        let available = buckets.get(bucket).map_or(0, Vec::len) as u32;
        if available < *wanted {
            return Err(AssessmentError::InsufficientPool {
                bucket: bucket.label().to_string(),
                requested: *wanted,
                available,
            });
        }
    }

    let seed: u64 = rand::random();
    let question_ids = draw(buckets, &quotas, seed);
    let generation = PoolGeneration {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.as_str().to_string(),
        pool_id: pool.id.clone(),
        quiz_id: quiz_id.map(str::to_string),
        // The column is signed; the bits round-trip unchanged.
        seed: seed as i64,
        requested_total: question_ids.len() as i32,
        digest: digest(&question_ids),
        question_ids: Json(question_ids),
        created_at: state.clock().now(),
    };
    state.store().insert_generation(&generation).await?;

    metrics::count(metrics::POOL_GENERATIONS, tenant.as_str());
    tracing::info!(
        tenant = %tenant,
        pool_id,
        generation_id = %generation.id,
        quiz_id = ?generation.quiz_id,
        selected = generation.requested_total,
        "Pool generation recorded"
    );
    Ok(generation)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Level(DifficultyLevel),
    Any,
}

impl Bucket {
    fn label(self) -> &'static str {
        match self {
            Self::Level(level) => level.as_str(),
            Self::Any => ANY_BUCKET,
        }
    }
}

fn effective_quotas(
    pool: &QuestionPool,
    requested_total: Option<u32>,
) -> ServiceResult<BTreeMap<Bucket, u32>> {
    let quota_total = pool.quota_total();
    if quota_total == 0 {
        return match requested_total {
            Some(total) if total > 0 => Ok(BTreeMap::from([(Bucket::Any, total)])),
            _ => Err(AssessmentError::validation(
                "pool has no quotas; requested_total must be a positive number",
            )),
        };
    }

    if let Some(total) = requested_total {
        if total != quota_total {
            return Err(AssessmentError::validation(format!(
                "requested_total {total} does not match the pool quota total {quota_total}"
            )));
        }
    }

    Ok(pool
        .quotas
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(level, count)| (Bucket::Level(*level), *count))
        .collect())
}

fn bucket_candidates(
    candidates: Vec<Question>,
    excluded: &HashSet<String>,
    quotas: &BTreeMap<Bucket, u32>,
) -> BTreeMap<Bucket, Vec<String>> {
    let mut buckets: BTreeMap<Bucket, Vec<String>> = BTreeMap::new();
    for question in candidates {
        if excluded.contains(&question.id) {
            continue;
        }
        let bucket = if quotas.contains_key(&Bucket::Any) {
            Bucket::Any
        } else {
            Bucket::Level(question.difficulty)
        };
        buckets.entry(bucket).or_default().push(question.id);
    }
    buckets
}

/// Uniform draw without replacement inside each bucket.
///
/// Candidates arrive ordered by id, so the same seed over the same bank
/// reproduces the same selection.
fn draw(mut buckets: BTreeMap<Bucket, Vec<String>>, quotas: &BTreeMap<Bucket, u32>, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut selected = Vec::new();
    for (bucket, wanted) in quotas {
        let Some(ids) = buckets.get_mut(bucket) else {
            continue;
        };
        ids.shuffle(&mut rng);
        selected.extend(ids.iter().take(*wanted as usize).cloned());
    }
    selected
}

fn digest(question_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    for id in question_ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn draw_is_reproducible_from_seed() {
        let quotas = BTreeMap::from([(Bucket::Level(DifficultyLevel::Easy), 2)]);
        let buckets = BTreeMap::from([(
            Bucket::Level(DifficultyLevel::Easy),
            ids(&["q1", "q2", "q3", "q4", "q5"]),
        )]);

        let first = draw(buckets.clone(), &quotas, 42);
        let second = draw(buckets, &quotas, 42);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn digest_depends_on_order() {
        assert_ne!(digest(&ids(&["a", "b"])), digest(&ids(&["b", "a"])));
        assert_eq!(digest(&ids(&["a", "b"])).len(), 64);
    }
}
