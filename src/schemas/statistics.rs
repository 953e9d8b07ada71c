use serde::Serialize;

use crate::db::types::QuestionType;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct QuestionStatistics {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) respondents: usize,
    pub(crate) fully_correct: usize,
    /// Fraction of respondents awarded full points; `None` without respondents.
    pub(crate) difficulty_index: Option<f64>,
    pub(crate) average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct QuizStatistics {
    pub(crate) quiz_id: String,
    pub(crate) started: usize,
    pub(crate) in_progress: usize,
    pub(crate) submitted: usize,
    pub(crate) graded: usize,
    pub(crate) expired: usize,
    pub(crate) pending_review: usize,
    pub(crate) finalized: usize,
    pub(crate) completion_rate: f64,
    pub(crate) unique_students: usize,
    pub(crate) average_score: Option<f64>,
    pub(crate) average_percentage: Option<f64>,
    pub(crate) pass_rate: Option<f64>,
    pub(crate) highest_score: Option<f64>,
    pub(crate) lowest_score: Option<f64>,
    pub(crate) questions: Vec<QuestionStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TrendPoint {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: String,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StudentTrend {
    pub(crate) student_id: String,
    pub(crate) points: Vec<TrendPoint>,
    pub(crate) average_percentage: Option<f64>,
    pub(crate) first_percentage: Option<f64>,
    pub(crate) latest_percentage: Option<f64>,
    pub(crate) delta: Option<f64>,
}
