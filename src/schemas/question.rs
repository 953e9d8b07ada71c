use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::answers::AnswerKey;
use crate::db::models::{Question, Tag};
use crate::db::types::{DifficultyLevel, QuestionType};

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    /// Defaults to the type the answer key is tagged with.
    #[serde(default)]
    #[serde(alias = "type")]
    pub(crate) question_type: Option<QuestionType>,
    #[validate(length(min = 1, max = 200, message = "subject must be 1-200 characters"))]
    pub(crate) subject: String,
    #[serde(default)]
    #[serde(alias = "classRef")]
    pub(crate) class_ref: Option<String>,
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: String,
    pub(crate) difficulty: DifficultyLevel,
    #[validate(range(exclusive_min = 0.0, message = "points must be positive"))]
    pub(crate) points: f64,
    #[serde(alias = "answerKey")]
    pub(crate) answer_key: AnswerKey,
    #[serde(default)]
    #[serde(alias = "tagIds")]
    pub(crate) tag_ids: Vec<String>,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    #[serde(alias = "type")]
    pub(crate) question_type: Option<QuestionType>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "subject must be 1-200 characters"))]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[serde(alias = "classRef")]
    pub(crate) class_ref: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "points must be positive"))]
    pub(crate) points: Option<f64>,
    #[serde(default)]
    #[serde(alias = "answerKey")]
    pub(crate) answer_key: Option<AnswerKey>,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

/// Optional overrides applied to the copy.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct QuestionDuplicate {
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "points must be positive"))]
    pub(crate) points: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct TagAttach {
    #[serde(alias = "tagIds")]
    #[validate(length(min = 1, message = "tag_ids must not be empty"))]
    pub(crate) tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QuestionSearchParams {
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[serde(alias = "type")]
    pub(crate) question_type: Option<QuestionType>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[serde(alias = "tag")]
    pub(crate) tag_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "q")]
    pub(crate) keyword: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

/// Rows stay raw JSON so one malformed row cannot fail the whole request.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BulkImportRequest {
    pub(crate) questions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImportRowError {
    pub(crate) index: usize,
    pub(crate) prompt: Option<String>,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BulkImportReport {
    pub(crate) total: usize,
    pub(crate) successful: usize,
    pub(crate) failed: usize,
    pub(crate) errors: Vec<ImportRowError>,
    pub(crate) imported_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) subject: String,
    pub(crate) class_ref: Option<String>,
    pub(crate) prompt: String,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) points: f64,
    pub(crate) auto_gradable: bool,
    pub(crate) answer_key: AnswerKey,
    pub(crate) tag_ids: Vec<String>,
    pub(crate) explanation: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            question_type: question.question_type,
            subject: question.subject,
            class_ref: question.class_ref,
            prompt: question.prompt,
            difficulty: question.difficulty,
            points: question.points,
            auto_gradable: question.question_type.is_auto_gradable(),
            answer_key: question.answer_key.0,
            tag_ids: question.tag_ids.0,
            explanation: question.explanation,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct TagCreate {
    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) created_at: String,
}

impl TagResponse {
    pub(crate) fn from_db(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            description: tag.description,
            created_at: format_primitive(tag.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct QuestionBankStatistics {
    pub(crate) total_questions: i64,
    pub(crate) auto_gradable_questions: i64,
    pub(crate) by_type: BTreeMap<String, i64>,
    pub(crate) by_difficulty: BTreeMap<String, i64>,
}
