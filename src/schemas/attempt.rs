use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::answers::{AnswerKey, AnswerPayload, ChoiceOption};
use crate::db::models::{QuizAttempt, Response};
use crate::db::types::{AttemptStatus, GradingStatus, QuestionType};

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct StartAttemptRequest {
    #[serde(alias = "studentId")]
    #[validate(length(min = 1, max = 128, message = "student_id must be 1-128 characters"))]
    pub(crate) student_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AnswerEntry {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    pub(crate) answer: AnswerPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AnswersRequest {
    #[serde(default)]
    pub(crate) answers: Vec<AnswerEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AttemptListParams {
    #[serde(default)]
    #[serde(alias = "studentId")]
    pub(crate) student_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<AttemptStatus>,
}

/// A snapshot question as the student sees it: no answer key.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptQuestionView {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) points: f64,
    pub(crate) options: Option<Vec<ChoiceOption>>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) quiz_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) deadline_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) finalized_at: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) total_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) questions: Vec<AttemptQuestionView>,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: QuizAttempt) -> Self {
        let questions = attempt
            .snapshot
            .0
            .into_iter()
            .map(|item| AttemptQuestionView {
                options: item.answer_key.options().map(<[ChoiceOption]>::to_vec),
                question_id: item.question_id,
                position: item.position,
                question_type: item.question_type,
                prompt: item.prompt,
                points: item.points,
            })
            .collect();

        Self {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            deadline_at: attempt.deadline_at.map(format_primitive),
            submitted_at: attempt.submitted_at.map(format_primitive),
            finalized_at: attempt.finalized_at.map(format_primitive),
            max_score: attempt.max_score,
            total_score: attempt.total_score,
            percentage: attempt.percentage,
            passed: attempt.passed,
            questions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseView {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) answer: Option<AnswerPayload>,
    pub(crate) awarded_score: Option<f64>,
    pub(crate) grading_status: GradingStatus,
    pub(crate) grader_id: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) suggested_score: Option<f64>,
    pub(crate) suggested_feedback: Option<String>,
}

impl ResponseView {
    pub(crate) fn from_db(response: Response) -> Self {
        Self {
            question_id: response.question_id,
            position: response.position,
            answer: response.answer.map(|answer| answer.0),
            awarded_score: response.awarded_score,
            grading_status: response.grading_status,
            grader_id: response.grader_id,
            feedback: response.feedback,
            graded_at: response.graded_at.map(format_primitive),
            suggested_score: response.suggested_score,
            suggested_feedback: response.suggested_feedback,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReviewItem {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) points: f64,
    pub(crate) answer: Option<AnswerPayload>,
    pub(crate) awarded_score: Option<f64>,
    pub(crate) grading_status: GradingStatus,
    pub(crate) feedback: Option<String>,
    /// Only revealed once the attempt is finalized.
    pub(crate) answer_key: Option<AnswerKey>,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptReview {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) finalized: bool,
    pub(crate) total_score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) items: Vec<ReviewItem>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptSummary {
    pub(crate) attempt_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) finalized: bool,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
    pub(crate) graded_responses: usize,
    pub(crate) pending_responses: usize,
    pub(crate) answered_questions: usize,
    pub(crate) total_questions: usize,
}
