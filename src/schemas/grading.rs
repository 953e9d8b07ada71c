use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::AttemptStatus;
use crate::schemas::attempt::ResponseView;

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
    #[serde(alias = "graderId")]
    #[validate(length(min = 1, max = 128, message = "grader_id must be 1-128 characters"))]
    pub(crate) grader_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct BatchGradeItem {
    #[serde(alias = "attemptId")]
    pub(crate) attempt_id: String,
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
    #[serde(alias = "graderId")]
    #[validate(length(min = 1, max = 128, message = "grader_id must be 1-128 characters"))]
    pub(crate) grader_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchGradeRequest {
    pub(crate) items: Vec<BatchGradeItem>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GradeResult {
    pub(crate) response: ResponseView,
    pub(crate) attempt_status: AttemptStatus,
    pub(crate) finalized: bool,
    pub(crate) pending_responses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ItemError {
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchItemOutcome {
    pub(crate) index: usize,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) success: bool,
    pub(crate) attempt_status: Option<AttemptStatus>,
    pub(crate) error: Option<ItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchGradeReport {
    pub(crate) total: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) results: Vec<BatchItemOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SuggestionResult {
    pub(crate) question_id: String,
    pub(crate) suggested_score: f64,
    pub(crate) suggested_feedback: Option<String>,
    pub(crate) max_score: f64,
}
