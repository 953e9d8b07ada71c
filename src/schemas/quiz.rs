use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::time::{format_primitive, parse_utc};
use crate::db::models::Quiz;
use crate::db::types::{GradingPolicy, QuizStatus};

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuizCreate {
    #[validate(length(min = 1, max = 300, message = "title must be 1-300 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[serde(alias = "questionIds")]
    pub(crate) question_ids: Vec<String>,
    #[serde(default)]
    #[serde(alias = "timeLimitSeconds")]
    #[validate(range(min = 1, message = "time_limit_seconds must be positive"))]
    pub(crate) time_limit_seconds: Option<i64>,
    #[serde(default)]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be at least 1"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default = "default_passing_score")]
    #[serde(alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be a percentage"))]
    pub(crate) passing_score: f64,
    #[serde(default = "default_grading_policy")]
    #[serde(alias = "gradingPolicy")]
    pub(crate) grading_policy: GradingPolicy,
    #[serde(default, alias = "availableFrom", deserialize_with = "deserialize_option_utc")]
    pub(crate) available_from: Option<PrimitiveDateTime>,
    #[serde(default, alias = "availableUntil", deserialize_with = "deserialize_option_utc")]
    pub(crate) available_until: Option<PrimitiveDateTime>,
    #[serde(default)]
    #[serde(alias = "randomizeQuestions")]
    pub(crate) randomize_questions: bool,
    #[serde(default)]
    #[serde(alias = "questionsToShow")]
    #[validate(range(min = 1, message = "questions_to_show must be at least 1"))]
    pub(crate) questions_to_show: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct QuizUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 300, message = "title must be 1-300 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[serde(alias = "questionIds")]
    pub(crate) question_ids: Option<Vec<String>>,
    #[serde(default)]
    #[serde(alias = "timeLimitSeconds")]
    #[validate(range(min = 1, message = "time_limit_seconds must be positive"))]
    pub(crate) time_limit_seconds: Option<i64>,
    /// Drops an existing time limit.
    #[serde(default)]
    #[serde(alias = "clearTimeLimit")]
    pub(crate) clear_time_limit: bool,
    #[serde(default)]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be at least 1"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default)]
    #[serde(alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be a percentage"))]
    pub(crate) passing_score: Option<f64>,
    #[serde(default)]
    #[serde(alias = "gradingPolicy")]
    pub(crate) grading_policy: Option<GradingPolicy>,
    #[serde(default, alias = "availableFrom", deserialize_with = "deserialize_option_utc")]
    pub(crate) available_from: Option<PrimitiveDateTime>,
    #[serde(default, alias = "availableUntil", deserialize_with = "deserialize_option_utc")]
    pub(crate) available_until: Option<PrimitiveDateTime>,
    /// Drops both ends of the availability window.
    #[serde(default)]
    #[serde(alias = "clearAvailability")]
    pub(crate) clear_availability: bool,
    #[serde(default)]
    #[serde(alias = "randomizeQuestions")]
    pub(crate) randomize_questions: Option<bool>,
    #[serde(default)]
    #[serde(alias = "questionsToShow")]
    #[validate(range(min = 1, message = "questions_to_show must be at least 1"))]
    pub(crate) questions_to_show: Option<i32>,
    /// Goes back to showing every question.
    #[serde(default)]
    #[serde(alias = "showAllQuestions")]
    pub(crate) show_all_questions: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct AddFromPoolRequest {
    #[serde(alias = "poolId")]
    #[validate(length(min = 1, message = "pool_id must not be empty"))]
    pub(crate) pool_id: String,
    #[serde(default)]
    #[serde(alias = "requestedTotal")]
    #[validate(range(min = 1, message = "requested_total must be positive"))]
    pub(crate) requested_total: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QuizListParams {
    #[serde(default)]
    pub(crate) status: Option<QuizStatus>,
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) status: QuizStatus,
    pub(crate) question_ids: Vec<String>,
    pub(crate) time_limit_seconds: Option<i64>,
    pub(crate) max_attempts: i32,
    pub(crate) passing_score: f64,
    pub(crate) grading_policy: GradingPolicy,
    pub(crate) available_from: Option<String>,
    pub(crate) available_until: Option<String>,
    pub(crate) randomize_questions: bool,
    pub(crate) questions_to_show: Option<i32>,
    pub(crate) cloned_from: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    pub(crate) archived_at: Option<String>,
}

impl QuizResponse {
    pub(crate) fn from_db(quiz: Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            subject: quiz.subject,
            status: quiz.status,
            question_ids: quiz.question_ids.0,
            time_limit_seconds: quiz.time_limit_seconds,
            max_attempts: quiz.max_attempts,
            passing_score: quiz.passing_score,
            grading_policy: quiz.grading_policy,
            available_from: quiz.available_from.map(format_primitive),
            available_until: quiz.available_until.map(format_primitive),
            randomize_questions: quiz.randomize_questions,
            questions_to_show: quiz.questions_to_show,
            cloned_from: quiz.cloned_from,
            created_at: format_primitive(quiz.created_at),
            updated_at: format_primitive(quiz.updated_at),
            published_at: quiz.published_at.map(format_primitive),
            archived_at: quiz.archived_at.map(format_primitive),
        }
    }
}

const fn default_passing_score() -> f64 {
    50.0
}

const fn default_grading_policy() -> GradingPolicy {
    GradingPolicy::Hybrid
}

fn deserialize_option_utc<'de, D>(deserializer: D) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_utc(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
            .map(Some),
        None => Ok(None),
    }
}
