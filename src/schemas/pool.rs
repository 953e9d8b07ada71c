use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{PoolGeneration, QuestionPool};
use crate::db::types::DifficultyLevel;

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct PoolCreate {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[validate(length(min = 1, max = 200, message = "subject must be 1-200 characters"))]
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) quotas: BTreeMap<DifficultyLevel, u32>,
    #[serde(default)]
    #[serde(alias = "requiredTagIds")]
    pub(crate) required_tag_ids: Vec<String>,
    #[serde(default = "default_allow_repeat")]
    #[serde(alias = "allowRepeat")]
    pub(crate) allow_repeat: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct PoolUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "subject must be 1-200 characters"))]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) quotas: Option<BTreeMap<DifficultyLevel, u32>>,
    #[serde(default)]
    #[serde(alias = "requiredTagIds")]
    pub(crate) required_tag_ids: Option<Vec<String>>,
    #[serde(default)]
    #[serde(alias = "allowRepeat")]
    pub(crate) allow_repeat: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct GenerateRequest {
    #[serde(default)]
    #[serde(alias = "requestedTotal")]
    #[validate(range(min = 1, message = "requested_total must be positive"))]
    pub(crate) requested_total: Option<u32>,
    #[serde(default)]
    #[serde(alias = "quizId")]
    pub(crate) quiz_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PoolResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) quotas: BTreeMap<DifficultyLevel, u32>,
    pub(crate) quota_total: u32,
    pub(crate) required_tag_ids: Vec<String>,
    pub(crate) allow_repeat: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl PoolResponse {
    pub(crate) fn from_db(pool: QuestionPool) -> Self {
        let quota_total = pool.quota_total();
        Self {
            id: pool.id,
            name: pool.name,
            description: pool.description,
            subject: pool.subject,
            quotas: pool.quotas.0,
            quota_total,
            required_tag_ids: pool.required_tag_ids.0,
            allow_repeat: pool.allow_repeat,
            created_at: format_primitive(pool.created_at),
            updated_at: format_primitive(pool.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerationResponse {
    pub(crate) id: String,
    pub(crate) pool_id: String,
    pub(crate) quiz_id: Option<String>,
    pub(crate) seed: String,
    pub(crate) requested_total: i32,
    pub(crate) question_ids: Vec<String>,
    pub(crate) digest: String,
    pub(crate) created_at: String,
}

impl GenerationResponse {
    pub(crate) fn from_db(generation: PoolGeneration) -> Self {
        Self {
            id: generation.id,
            pool_id: generation.pool_id,
            quiz_id: generation.quiz_id,
            // Seeds are u64 on the wire; the i64 column only stores the bits.
            seed: (generation.seed as u64).to_string(),
            requested_total: generation.requested_total,
            question_ids: generation.question_ids.0,
            digest: generation.digest,
            created_at: format_primitive(generation.created_at),
        }
    }
}

const fn default_allow_repeat() -> bool {
    true
}
