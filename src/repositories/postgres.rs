mod attempts;
mod pools;
mod questions;
mod quizzes;
mod tags;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::answers::AnswerPayload;
use crate::db::models::{PoolGeneration, Question, QuestionPool, Quiz, QuizAttempt, Response, Tag};
use crate::db::types::{AttemptStatus, GradingStatus, QuizStatus};
use crate::repositories::{
    final_status, tally, AttemptCreation, AttemptFilter, CloseAttempt, FinalizeOutcome,
    GradeWrite, NewAttempt, Page, QuestionCount, QuestionFilter, QuizFilter, ResponseGrade,
    Store, StoreError, StoreResult,
};

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        Ok(questions::insert(&self.pool, question).await?)
    }

    async fn find_question(&self, tenant: &str, id: &str) -> StoreResult<Option<Question>> {
        Ok(questions::find_active(&self.pool, tenant, id).await?)
    }

    async fn find_questions(&self, tenant: &str, ids: &[String]) -> StoreResult<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(questions::find_many_active(&self.pool, tenant, ids).await?)
    }

    async fn update_question(&self, question: &Question) -> StoreResult<bool> {
        Ok(questions::update_active(&self.pool, question).await?)
    }

    async fn search_questions(
        &self,
        tenant: &str,
        filter: &QuestionFilter,
    ) -> StoreResult<Page<Question>> {
        let items = questions::search(&self.pool, tenant, filter).await?;
        let total_count = questions::count(&self.pool, tenant, filter).await?;
        Ok(Page { items, total_count })
    }

    async fn list_candidates(
        &self,
        tenant: &str,
        subject: &str,
        required_tags: &[String],
    ) -> StoreResult<Vec<Question>> {
        Ok(questions::list_candidates(&self.pool, tenant, subject, required_tags).await?)
    }

    async fn count_questions(&self, tenant: &str) -> StoreResult<Vec<QuestionCount>> {
        let rows = questions::count_by_type_and_difficulty(&self.pool, tenant).await?;
        Ok(rows
            .into_iter()
            .map(|row| QuestionCount {
                question_type: row.question_type,
                difficulty: row.difficulty,
                count: row.count,
            })
            .collect())
    }

    async fn insert_tag(&self, tag: &Tag) -> StoreResult<bool> {
        Ok(tags::insert(&self.pool, tag).await?)
    }

    async fn find_tag(&self, tenant: &str, id: &str) -> StoreResult<Option<Tag>> {
        Ok(tags::find_active(&self.pool, tenant, id).await?)
    }

    async fn list_tags(&self, tenant: &str) -> StoreResult<Vec<Tag>> {
        Ok(tags::list_active(&self.pool, tenant).await?)
    }

    async fn delete_tag(&self, tenant: &str, id: &str) -> StoreResult<bool> {
        Ok(tags::soft_delete(&self.pool, tenant, id).await?)
    }

    async fn insert_pool(&self, pool: &QuestionPool) -> StoreResult<()> {
        Ok(pools::insert(&self.pool, pool).await?)
    }

    async fn find_pool(&self, tenant: &str, id: &str) -> StoreResult<Option<QuestionPool>> {
        Ok(pools::find_active(&self.pool, tenant, id).await?)
    }

    async fn update_pool(&self, pool: &QuestionPool) -> StoreResult<bool> {
        Ok(pools::update_active(&self.pool, pool).await?)
    }

    async fn list_pools(&self, tenant: &str) -> StoreResult<Vec<QuestionPool>> {
        Ok(pools::list_active(&self.pool, tenant).await?)
    }

    async fn insert_generation(&self, generation: &PoolGeneration) -> StoreResult<()> {
        Ok(pools::insert_generation(&self.pool, generation).await?)
    }

    async fn list_generations(
        &self,
        tenant: &str,
        pool_id: &str,
        quiz_id: Option<&str>,
    ) -> StoreResult<Vec<PoolGeneration>> {
        Ok(pools::list_generations(&self.pool, tenant, pool_id, quiz_id).await?)
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        Ok(quizzes::insert(&self.pool, quiz).await?)
    }

    async fn find_quiz(&self, tenant: &str, id: &str) -> StoreResult<Option<Quiz>> {
        Ok(quizzes::find_active(&self.pool, tenant, id).await?)
    }

    async fn update_draft_quiz(&self, quiz: &Quiz) -> StoreResult<bool> {
        Ok(quizzes::update_draft(&self.pool, quiz).await?)
    }

    async fn transition_quiz(
        &self,
        tenant: &str,
        id: &str,
        from: QuizStatus,
        to: QuizStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        Ok(quizzes::transition(&self.pool, tenant, id, from, to, at).await?)
    }

    async fn delete_quiz(&self, tenant: &str, id: &str, at: PrimitiveDateTime) -> StoreResult<bool> {
        Ok(quizzes::soft_delete(&self.pool, tenant, id, at).await?)
    }

    async fn list_quizzes(&self, tenant: &str, filter: &QuizFilter) -> StoreResult<Page<Quiz>> {
        let items = quizzes::list(&self.pool, tenant, filter).await?;
        let total_count = quizzes::count(&self.pool, tenant, filter).await?;
        Ok(Page { items, total_count })
    }

    async fn create_attempt(&self, new: NewAttempt) -> StoreResult<AttemptCreation> {
        let NewAttempt { mut attempt, responses, max_attempts } = new;
        let mut tx = self.pool.begin().await?;

        attempts::acquire_pair_lock(
            &mut *tx,
            &attempt.tenant_id,
            &attempt.quiz_id,
            &attempt.student_id,
        )
        .await?;

        if attempts::find_active_for_pair(
            &mut *tx,
            &attempt.tenant_id,
            &attempt.quiz_id,
            &attempt.student_id,
        )
        .await?
        .is_some()
        {
            return Ok(AttemptCreation::ActiveExists);
        }

        let prior = attempts::count_for_pair(
            &mut *tx,
            &attempt.tenant_id,
            &attempt.quiz_id,
            &attempt.student_id,
        )
        .await?;
        if prior >= i64::from(max_attempts) {
            return Ok(AttemptCreation::LimitReached);
        }

        attempt.attempt_number = i32::try_from(prior + 1).map_err(|_| StoreError::Corrupt {
            entity: "attempt",
            id: attempt.id.clone(),
            reason: format!("attempt count {prior} overflows"),
        })?;

        // The partial unique index still guards the pair if the lock is ever bypassed.
        if !attempts::insert(&mut *tx, &attempt).await? {
            return Ok(AttemptCreation::ActiveExists);
        }
        attempts::insert_responses(&mut *tx, &responses).await?;
        tx.commit().await?;

        Ok(AttemptCreation::Created(attempt))
    }

    async fn find_attempt(&self, tenant: &str, id: &str) -> StoreResult<Option<QuizAttempt>> {
        Ok(attempts::find(&self.pool, tenant, id).await?)
    }

    async fn list_attempts(
        &self,
        tenant: &str,
        filter: &AttemptFilter,
    ) -> StoreResult<Vec<QuizAttempt>> {
        Ok(attempts::list(&self.pool, tenant, filter).await?)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> StoreResult<Vec<QuizAttempt>> {
        Ok(attempts::list_overdue(&self.pool, now, limit).await?)
    }

    async fn list_responses(&self, tenant: &str, attempt_id: &str) -> StoreResult<Vec<Response>> {
        Ok(attempts::list_responses(&self.pool, tenant, attempt_id).await?)
    }

    async fn list_responses_for_attempts(
        &self,
        tenant: &str,
        attempt_ids: &[String],
    ) -> StoreResult<Vec<Response>> {
        if attempt_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(attempts::list_responses_for_attempts(&self.pool, tenant, attempt_ids).await?)
    }

    async fn save_answers(
        &self,
        tenant: &str,
        attempt_id: &str,
        answers: &[(String, AnswerPayload)],
        at: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        if attempts::find_for_update(&mut *tx, tenant, attempt_id).await?.is_none() {
            return Ok(false);
        }
        if !attempts::touch_in_progress(&mut *tx, tenant, attempt_id, at).await? {
            return Ok(false);
        }
        for (question_id, answer) in answers {
            attempts::save_answer(&mut *tx, tenant, attempt_id, question_id, answer).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn close_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        close: CloseAttempt<'_>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        // The status update waits on the row lock `save_answers` holds, so the
        // responses read below include any save that committed first.
        if !attempts::close(&mut *tx, tenant, attempt_id, close.status, close.at).await? {
            return Ok(false);
        }
        for (question_id, answer) in &close.answers {
            attempts::save_answer(&mut *tx, tenant, attempt_id, question_id, answer).await?;
        }
        let responses = attempts::list_responses(&mut *tx, tenant, attempt_id).await?;
        for response in (close.score)(responses) {
            attempts::write_closing_response(&mut *tx, &response).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn grade_response(
        &self,
        tenant: &str,
        attempt_id: &str,
        question_id: &str,
        grade: &ResponseGrade,
    ) -> StoreResult<GradeWrite> {
        let mut tx = self.pool.begin().await?;
        // Attempt row first, the same order `finalize_attempt` locks in.
        let Some(attempt) = attempts::find_for_update(&mut *tx, tenant, attempt_id).await? else {
            return Ok(GradeWrite::Missing);
        };
        let Some(current) =
            attempts::find_response_for_update(&mut *tx, tenant, attempt_id, question_id).await?
        else {
            return Ok(GradeWrite::Missing);
        };

        let unchanged = current.grading_status == GradingStatus::ManuallyGraded
            && current.awarded_score == Some(grade.score)
            && current.feedback == grade.feedback
            && current.grader_id.as_deref() == Some(grade.grader_id.as_str());
        if unchanged {
            return Ok(GradeWrite::Unchanged);
        }
        if attempt.status == AttemptStatus::Graded {
            return Ok(GradeWrite::Locked);
        }

        attempts::write_manual_grade(&mut *tx, tenant, attempt_id, question_id, grade).await?;
        tx.commit().await?;
        Ok(GradeWrite::Applied)
    }

    async fn record_suggestion(
        &self,
        tenant: &str,
        attempt_id: &str,
        question_id: &str,
        score: f64,
        feedback: Option<String>,
    ) -> StoreResult<bool> {
        Ok(attempts::write_suggestion(&self.pool, tenant, attempt_id, question_id, score, feedback)
            .await?)
    }

    async fn finalize_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        at: PrimitiveDateTime,
    ) -> StoreResult<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;
        let Some(attempt) = attempts::find_for_update(&mut *tx, tenant, attempt_id).await? else {
            return Ok(FinalizeOutcome::Missing);
        };
        if !attempt.status.is_closed() {
            return Ok(FinalizeOutcome::NotClosed);
        }

        let responses = attempts::list_responses(&mut *tx, tenant, attempt_id).await?;
        let result = tally(&responses, attempt.max_score, attempt.passing_score);
        if result.pending > 0 {
            return Ok(FinalizeOutcome::Pending(result.pending));
        }

        let newly_finalized = attempt.finalized_at.is_none();
        let updated = attempts::write_final_scores(
            &mut *tx,
            tenant,
            attempt_id,
            final_status(attempt.status),
            &result,
            at,
        )
        .await?;
        tx.commit().await?;

        Ok(FinalizeOutcome::Finalized { attempt: updated, newly_finalized })
    }
}
