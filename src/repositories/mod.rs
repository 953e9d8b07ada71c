//! Persistence contract for the assessment engine.
//!
//! Services only talk to [`Store`]. Every read and write is scoped by tenant,
//! and a record owned by another tenant is reported exactly like a missing one.
//! Compound operations (`create_attempt`, `close_attempt`,
//! `finalize_attempt`) are atomic in every implementation.

pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::answers::AnswerPayload;
use crate::db::models::{
    PoolGeneration, Question, QuestionPool, Quiz, QuizAttempt, Response, Tag,
};
use crate::db::types::{
    AttemptStatus, DifficultyLevel, GradingStatus, QuestionType, QuizStatus,
};

pub(crate) use memory::MemoryStore;
pub(crate) use postgres::PgStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt {entity} record {id}: {reason}")]
    Corrupt { entity: &'static str, id: String, reason: String },
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub(crate) struct Page<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QuestionFilter {
    pub(crate) subject: Option<String>,
    pub(crate) question_type: Option<QuestionType>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) tag_id: Option<String>,
    pub(crate) keyword: Option<String>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QuizFilter {
    pub(crate) status: Option<QuizStatus>,
    pub(crate) subject: Option<String>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AttemptFilter {
    pub(crate) quiz_id: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) status: Option<AttemptStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuestionCount {
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) count: i64,
}

/// A freshly built attempt. The store assigns `attempt_number`.
#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) attempt: QuizAttempt,
    pub(crate) responses: Vec<Response>,
    pub(crate) max_attempts: i32,
}

#[derive(Debug, Clone)]
pub(crate) enum AttemptCreation {
    Created(QuizAttempt),
    ActiveExists,
    LimitReached,
}

/// Scores an attempt's responses as they stand when it closes.
pub(crate) type ResponseScorer<'s> = dyn Fn(Vec<Response>) -> Vec<Response> + Send + Sync + 's;

/// Moves an attempt out of IN_PROGRESS.
///
/// `answers` are applied and `score` runs over the stored responses after the
/// status check, under the same lock, so a concurrent save is never lost.
pub(crate) struct CloseAttempt<'a> {
    pub(crate) status: AttemptStatus,
    pub(crate) at: PrimitiveDateTime,
    pub(crate) answers: Vec<(String, AnswerPayload)>,
    pub(crate) score: &'a ResponseScorer<'a>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResponseGrade {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) grader_id: String,
    pub(crate) at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradeWrite {
    Applied,
    Unchanged,
    /// The attempt is GRADED; its responses no longer change.
    Locked,
    Missing,
}

#[derive(Debug, Clone)]
pub(crate) enum FinalizeOutcome {
    Missing,
    NotClosed,
    Pending(usize),
    Finalized { attempt: QuizAttempt, newly_finalized: bool },
}

#[async_trait]
pub(crate) trait Store: Send + Sync {
    /// Short backend name reported by the health check.
    fn backend(&self) -> &'static str;
    async fn ping(&self) -> StoreResult<()>;

    async fn insert_question(&self, question: &Question) -> StoreResult<()>;
    async fn find_question(&self, tenant: &str, id: &str) -> StoreResult<Option<Question>>;
    async fn find_questions(&self, tenant: &str, ids: &[String]) -> StoreResult<Vec<Question>>;
    /// Replaces an active question. Returns false if it is missing or deleted.
    async fn update_question(&self, question: &Question) -> StoreResult<bool>;
    async fn search_questions(
        &self,
        tenant: &str,
        filter: &QuestionFilter,
    ) -> StoreResult<Page<Question>>;
    /// Active questions of `subject` carrying every tag in `required_tags`, ordered by id.
    async fn list_candidates(
        &self,
        tenant: &str,
        subject: &str,
        required_tags: &[String],
    ) -> StoreResult<Vec<Question>>;
    async fn count_questions(&self, tenant: &str) -> StoreResult<Vec<QuestionCount>>;

    /// Returns false when an active tag with the same name already exists.
    async fn insert_tag(&self, tag: &Tag) -> StoreResult<bool>;
    async fn find_tag(&self, tenant: &str, id: &str) -> StoreResult<Option<Tag>>;
    async fn list_tags(&self, tenant: &str) -> StoreResult<Vec<Tag>>;
    async fn delete_tag(&self, tenant: &str, id: &str) -> StoreResult<bool>;

    async fn insert_pool(&self, pool: &QuestionPool) -> StoreResult<()>;
    async fn find_pool(&self, tenant: &str, id: &str) -> StoreResult<Option<QuestionPool>>;
    async fn update_pool(&self, pool: &QuestionPool) -> StoreResult<bool>;
    async fn list_pools(&self, tenant: &str) -> StoreResult<Vec<QuestionPool>>;
    async fn insert_generation(&self, generation: &PoolGeneration) -> StoreResult<()>;
    async fn list_generations(
        &self,
        tenant: &str,
        pool_id: &str,
        quiz_id: Option<&str>,
    ) -> StoreResult<Vec<PoolGeneration>>;

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()>;
    async fn find_quiz(&self, tenant: &str, id: &str) -> StoreResult<Option<Quiz>>;
    /// Replaces a quiz only while it is still DRAFT.
    async fn update_draft_quiz(&self, quiz: &Quiz) -> StoreResult<bool>;
    /// Compare-and-set on quiz status.
    async fn transition_quiz(
        &self,
        tenant: &str,
        id: &str,
        from: QuizStatus,
        to: QuizStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<bool>;
    /// Soft-deletes a quiz that is not PUBLISHED.
    async fn delete_quiz(&self, tenant: &str, id: &str, at: PrimitiveDateTime) -> StoreResult<bool>;
    async fn list_quizzes(&self, tenant: &str, filter: &QuizFilter) -> StoreResult<Page<Quiz>>;

    async fn create_attempt(&self, new: NewAttempt) -> StoreResult<AttemptCreation>;
    async fn find_attempt(&self, tenant: &str, id: &str) -> StoreResult<Option<QuizAttempt>>;
    async fn list_attempts(
        &self,
        tenant: &str,
        filter: &AttemptFilter,
    ) -> StoreResult<Vec<QuizAttempt>>;
    /// IN_PROGRESS attempts of every tenant whose deadline is at or before `now`.
    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> StoreResult<Vec<QuizAttempt>>;
    async fn list_responses(&self, tenant: &str, attempt_id: &str) -> StoreResult<Vec<Response>>;
    async fn list_responses_for_attempts(
        &self,
        tenant: &str,
        attempt_ids: &[String],
    ) -> StoreResult<Vec<Response>>;
    /// Records answers on an IN_PROGRESS attempt. Returns false once it is closed.
    async fn save_answers(
        &self,
        tenant: &str,
        attempt_id: &str,
        answers: &[(String, AnswerPayload)],
        at: PrimitiveDateTime,
    ) -> StoreResult<bool>;
    /// Compare-and-set IN_PROGRESS -> `close.status`. Only the first caller wins.
    async fn close_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        close: CloseAttempt<'_>,
    ) -> StoreResult<bool>;
    /// Writes a manual grade. An identical repeat is `Unchanged`; any other
    /// write to a GRADED attempt is `Locked`.
    async fn grade_response(
        &self,
        tenant: &str,
        attempt_id: &str,
        question_id: &str,
        grade: &ResponseGrade,
    ) -> StoreResult<GradeWrite>;
    async fn record_suggestion(
        &self,
        tenant: &str,
        attempt_id: &str,
        question_id: &str,
        score: f64,
        feedback: Option<String>,
    ) -> StoreResult<bool>;
    /// Recomputes totals and moves a fully scored attempt to its final state.
    async fn finalize_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        at: PrimitiveDateTime,
    ) -> StoreResult<FinalizeOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreTally {
    pub(crate) pending: usize,
    pub(crate) total: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
}

pub(crate) fn tally(responses: &[Response], max_score: f64, passing_score: f64) -> ScoreTally {
    let pending =
        responses.iter().filter(|response| response.grading_status == GradingStatus::Pending).count();
    let total = round2(responses.iter().filter_map(|response| response.awarded_score).sum());
    let percentage = if max_score > 0.0 { round2(total / max_score * 100.0) } else { 0.0 };
    ScoreTally { pending, total, percentage, passed: percentage >= passing_score }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The status a fully scored attempt settles in.
pub(crate) fn final_status(current: AttemptStatus) -> AttemptStatus {
    match current {
        AttemptStatus::Expired => AttemptStatus::Expired,
        _ => AttemptStatus::Graded,
    }
}
