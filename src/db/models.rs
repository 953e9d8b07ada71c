use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::answers::{AnswerKey, AnswerPayload};
use crate::db::types::{
    AttemptStatus, DifficultyLevel, GradingPolicy, GradingStatus, LifecycleStatus, QuestionType,
    QuizStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) subject: String,
    pub(crate) class_ref: Option<String>,
    pub(crate) prompt: String,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) points: f64,
    pub(crate) answer_key: Json<AnswerKey>,
    pub(crate) tag_ids: Json<Vec<String>>,
    pub(crate) explanation: Option<String>,
    pub(crate) status: LifecycleStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Tag {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) status: LifecycleStatus,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionPool {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) quotas: Json<BTreeMap<DifficultyLevel, u32>>,
    pub(crate) required_tag_ids: Json<Vec<String>>,
    pub(crate) allow_repeat: bool,
    pub(crate) status: LifecycleStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl QuestionPool {
    pub(crate) fn quota_total(&self) -> u32 {
        self.quotas.values().sum()
    }
}

/// Audit record of one draw from a pool.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PoolGeneration {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) pool_id: String,
    pub(crate) quiz_id: Option<String>,
    pub(crate) seed: i64,
    pub(crate) requested_total: i32,
    pub(crate) question_ids: Json<Vec<String>>,
    pub(crate) digest: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Quiz {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) status: QuizStatus,
    pub(crate) question_ids: Json<Vec<String>>,
    pub(crate) time_limit_seconds: Option<i64>,
    pub(crate) max_attempts: i32,
    pub(crate) passing_score: f64,
    pub(crate) grading_policy: GradingPolicy,
    pub(crate) available_from: Option<PrimitiveDateTime>,
    pub(crate) available_until: Option<PrimitiveDateTime>,
    /// Each attempt sees the questions in its own shuffled order.
    pub(crate) randomize_questions: bool,
    /// Attempts draw this many of the quiz's questions; `None` means all.
    pub(crate) questions_to_show: Option<i32>,
    pub(crate) lifecycle: LifecycleStatus,
    pub(crate) cloned_from: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) archived_at: Option<PrimitiveDateTime>,
}

/// A question as it looked when the attempt started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SnapshotQuestion {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) answer_key: AnswerKey,
    pub(crate) points: f64,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuizAttempt {
    pub(crate) id: String,
    pub(crate) tenant_id: String,
    pub(crate) quiz_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
    pub(crate) snapshot: Json<Vec<SnapshotQuestion>>,
    pub(crate) max_score: f64,
    pub(crate) passing_score: f64,
    pub(crate) grading_policy: GradingPolicy,
    pub(crate) total_score: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Quiz {
    /// Whether `now` falls inside the optional availability window.
    pub(crate) fn is_open_at(&self, now: PrimitiveDateTime) -> bool {
        self.available_from.map_or(true, |from| now >= from)
            && self.available_until.map_or(true, |until| now <= until)
    }
}

impl QuizAttempt {
    pub(crate) fn snapshot_question(&self, question_id: &str) -> Option<&SnapshotQuestion> {
        self.snapshot.iter().find(|item| item.question_id == question_id)
    }

    pub(crate) fn is_past_deadline(&self, now: PrimitiveDateTime) -> bool {
        self.deadline_at.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct Response {
    pub(crate) tenant_id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) answer: Option<Json<AnswerPayload>>,
    pub(crate) awarded_score: Option<f64>,
    pub(crate) grading_status: GradingStatus,
    pub(crate) grader_id: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) suggested_score: Option<f64>,
    pub(crate) suggested_feedback: Option<String>,
}
