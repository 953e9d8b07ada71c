use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::RwLock;

use crate::db::answers::AnswerPayload;
use crate::db::models::{PoolGeneration, Question, QuestionPool, Quiz, QuizAttempt, Response, Tag};
use crate::db::types::{AttemptStatus, GradingStatus, LifecycleStatus, QuizStatus};
use crate::repositories::{
    final_status, tally, AttemptCreation, AttemptFilter, CloseAttempt, FinalizeOutcome,
    GradeWrite, NewAttempt, Page, QuestionCount, QuestionFilter, QuizFilter, ResponseGrade,
    Store, StoreResult,
};

#[derive(Default)]
struct Tables {
    questions: HashMap<String, Question>,
    tags: HashMap<String, Tag>,
    pools: HashMap<String, QuestionPool>,
    generations: Vec<PoolGeneration>,
    quizzes: HashMap<String, Quiz>,
    attempts: HashMap<String, QuizAttempt>,
    responses: HashMap<String, Vec<Response>>,
}

/// In-process store. Every compound operation runs under one write lock.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

fn owned<'a, T>(
    row: Option<&'a T>,
    tenant: &str,
    tenant_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    row.filter(|row| tenant_of(row) == tenant)
}

fn page<T: Clone>(rows: Vec<T>, skip: i64, limit: i64) -> Page<T> {
    let total_count = rows.len() as i64;
    let skip = skip.max(0) as usize;
    let limit = limit.clamp(1, 1000) as usize;
    Page { items: rows.into_iter().skip(skip).take(limit).collect(), total_count }
}

fn matches_keyword(question: &Question, keyword: &str) -> bool {
    let needle = keyword.to_lowercase();
    question.prompt.to_lowercase().contains(&needle)
        || question.subject.to_lowercase().contains(&needle)
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.questions.insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn find_question(&self, tenant: &str, id: &str) -> StoreResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(owned(tables.questions.get(id), tenant, |q| q.tenant_id.as_str())
            .filter(|q| q.status.is_active())
            .cloned())
    }

    async fn find_questions(&self, tenant: &str, ids: &[String]) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| owned(tables.questions.get(id), tenant, |q| q.tenant_id.as_str()))
            .filter(|q| q.status.is_active())
            .cloned()
            .collect())
    }

    async fn update_question(&self, question: &Question) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.questions.get_mut(&question.id) {
            Some(existing)
                if existing.tenant_id == question.tenant_id && existing.status.is_active() =>
            {
                *existing = question.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn search_questions(
        &self,
        tenant: &str,
        filter: &QuestionFilter,
    ) -> StoreResult<Page<Question>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.tenant_id == tenant && q.status.is_active())
            .filter(|q| filter.subject.as_ref().map_or(true, |subject| &q.subject == subject))
            .filter(|q| filter.question_type.map_or(true, |kind| q.question_type == kind))
            .filter(|q| filter.difficulty.map_or(true, |level| q.difficulty == level))
            .filter(|q| filter.tag_id.as_ref().map_or(true, |tag| q.tag_ids.contains(tag)))
            .filter(|q| filter.keyword.as_deref().map_or(true, |kw| matches_keyword(q, kw)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(page(rows, filter.skip, filter.limit))
    }

    async fn list_candidates(
        &self,
        tenant: &str,
        subject: &str,
        required_tags: &[String],
    ) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.tenant_id == tenant && q.status.is_active() && q.subject == subject)
            .filter(|q| required_tags.iter().all(|tag| q.tag_ids.contains(tag)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn count_questions(&self, tenant: &str) -> StoreResult<Vec<QuestionCount>> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<_, i64> = HashMap::new();
        for question in tables.questions.values() {
            if question.tenant_id == tenant && question.status.is_active() {
                *counts.entry((question.question_type, question.difficulty)).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|((question_type, difficulty), count)| QuestionCount {
                question_type,
                difficulty,
                count,
            })
            .collect())
    }

    async fn insert_tag(&self, tag: &Tag) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let taken = tables.tags.values().any(|existing| {
            existing.tenant_id == tag.tenant_id
                && existing.status.is_active()
                && existing.name.to_lowercase() == tag.name.to_lowercase()
        });
        if taken {
            return Ok(false);
        }
        tables.tags.insert(tag.id.clone(), tag.clone());
        Ok(true)
    }

    async fn find_tag(&self, tenant: &str, id: &str) -> StoreResult<Option<Tag>> {
        let tables = self.tables.read().await;
        Ok(owned(tables.tags.get(id), tenant, |t| t.tenant_id.as_str())
            .filter(|t| t.status.is_active())
            .cloned())
    }

    async fn list_tags(&self, tenant: &str) -> StoreResult<Vec<Tag>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Tag> = tables
            .tags
            .values()
            .filter(|t| t.tenant_id == tenant && t.status.is_active())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(rows)
    }

    async fn delete_tag(&self, tenant: &str, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.tags.get_mut(id) {
            Some(tag) if tag.tenant_id == tenant && tag.status.is_active() => {
                tag.status = LifecycleStatus::Deleted;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_pool(&self, pool: &QuestionPool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.pools.insert(pool.id.clone(), pool.clone());
        Ok(())
    }

    async fn find_pool(&self, tenant: &str, id: &str) -> StoreResult<Option<QuestionPool>> {
        let tables = self.tables.read().await;
        Ok(owned(tables.pools.get(id), tenant, |p| p.tenant_id.as_str())
            .filter(|p| p.status.is_active())
            .cloned())
    }

    async fn update_pool(&self, pool: &QuestionPool) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.pools.get_mut(&pool.id) {
            Some(existing)
                if existing.tenant_id == pool.tenant_id && existing.status.is_active() =>
            {
                *existing = pool.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pools(&self, tenant: &str) -> StoreResult<Vec<QuestionPool>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QuestionPool> = tables
            .pools
            .values()
            .filter(|p| p.tenant_id == tenant && p.status.is_active())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert_generation(&self, generation: &PoolGeneration) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.generations.push(generation.clone());
        Ok(())
    }

    async fn list_generations(
        &self,
        tenant: &str,
        pool_id: &str,
        quiz_id: Option<&str>,
    ) -> StoreResult<Vec<PoolGeneration>> {
        let tables = self.tables.read().await;
        Ok(tables
            .generations
            .iter()
            .filter(|g| g.tenant_id == tenant && g.pool_id == pool_id)
            .filter(|g| quiz_id.map_or(true, |quiz| g.quiz_id.as_deref() == Some(quiz)))
            .cloned()
            .collect())
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.quizzes.insert(quiz.id.clone(), quiz.clone());
        Ok(())
    }

    async fn find_quiz(&self, tenant: &str, id: &str) -> StoreResult<Option<Quiz>> {
        let tables = self.tables.read().await;
        Ok(owned(tables.quizzes.get(id), tenant, |q| q.tenant_id.as_str())
            .filter(|q| q.lifecycle.is_active())
            .cloned())
    }

    async fn update_draft_quiz(&self, quiz: &Quiz) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.quizzes.get_mut(&quiz.id) {
            Some(existing)
                if existing.tenant_id == quiz.tenant_id
                    && existing.lifecycle.is_active()
                    && existing.status == QuizStatus::Draft =>
            {
                *existing = quiz.clone();
                existing.status = QuizStatus::Draft;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_quiz(
        &self,
        tenant: &str,
        id: &str,
        from: QuizStatus,
        to: QuizStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.quizzes.get_mut(id) {
            Some(quiz)
                if quiz.tenant_id == tenant && quiz.lifecycle.is_active() && quiz.status == from =>
            {
                quiz.status = to;
                quiz.updated_at = at;
                match to {
                    QuizStatus::Published => quiz.published_at = Some(at),
                    QuizStatus::Archived => quiz.archived_at = Some(at),
                    QuizStatus::Draft => {}
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_quiz(&self, tenant: &str, id: &str, at: PrimitiveDateTime) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.quizzes.get_mut(id) {
            Some(quiz)
                if quiz.tenant_id == tenant
                    && quiz.lifecycle.is_active()
                    && quiz.status != QuizStatus::Published =>
            {
                quiz.lifecycle = LifecycleStatus::Deleted;
                quiz.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_quizzes(&self, tenant: &str, filter: &QuizFilter) -> StoreResult<Page<Quiz>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Quiz> = tables
            .quizzes
            .values()
            .filter(|q| q.tenant_id == tenant && q.lifecycle.is_active())
            .filter(|q| filter.status.map_or(true, |status| q.status == status))
            .filter(|q| {
                filter.subject.as_ref().map_or(true, |subject| q.subject.as_ref() == Some(subject))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(page(rows, filter.skip, filter.limit))
    }

    async fn create_attempt(&self, new: NewAttempt) -> StoreResult<AttemptCreation> {
        let mut tables = self.tables.write().await;
        let NewAttempt { mut attempt, responses, max_attempts } = new;

        let prior: Vec<&QuizAttempt> = tables
            .attempts
            .values()
            .filter(|existing| {
                existing.tenant_id == attempt.tenant_id
                    && existing.quiz_id == attempt.quiz_id
                    && existing.student_id == attempt.student_id
            })
            .collect();

        if prior.iter().any(|existing| existing.status == AttemptStatus::InProgress) {
            return Ok(AttemptCreation::ActiveExists);
        }
        if prior.len() as i64 >= i64::from(max_attempts) {
            return Ok(AttemptCreation::LimitReached);
        }

        attempt.attempt_number = prior.len() as i32 + 1;
        tables.responses.insert(attempt.id.clone(), responses);
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(AttemptCreation::Created(attempt))
    }

    async fn find_attempt(&self, tenant: &str, id: &str) -> StoreResult<Option<QuizAttempt>> {
        let tables = self.tables.read().await;
        Ok(owned(tables.attempts.get(id), tenant, |a| a.tenant_id.as_str()).cloned())
    }

    async fn list_attempts(
        &self,
        tenant: &str,
        filter: &AttemptFilter,
    ) -> StoreResult<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QuizAttempt> = tables
            .attempts
            .values()
            .filter(|a| a.tenant_id == tenant)
            .filter(|a| filter.quiz_id.as_ref().map_or(true, |quiz| &a.quiz_id == quiz))
            .filter(|a| filter.student_id.as_ref().map_or(true, |student| &a.student_id == student))
            .filter(|a| filter.status.map_or(true, |status| a.status == status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> StoreResult<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QuizAttempt> = tables
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::InProgress && a.is_past_deadline(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.deadline_at.cmp(&b.deadline_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_responses(&self, tenant: &str, attempt_id: &str) -> StoreResult<Vec<Response>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Response> = tables
            .responses
            .get(attempt_id)
            .map(|rows| rows.iter().filter(|r| r.tenant_id == tenant).cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.position);
        Ok(rows)
    }

    async fn list_responses_for_attempts(
        &self,
        tenant: &str,
        attempt_ids: &[String],
    ) -> StoreResult<Vec<Response>> {
        let tables = self.tables.read().await;
        Ok(attempt_ids
            .iter()
            .filter_map(|id| tables.responses.get(id))
            .flatten()
            .filter(|r| r.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn save_answers(
        &self,
        tenant: &str,
        attempt_id: &str,
        answers: &[(String, AnswerPayload)],
        at: PrimitiveDateTime,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Tables { attempts, responses, .. } = &mut *tables;
        let Some(attempt) = attempts.get_mut(attempt_id) else {
            return Ok(false);
        };
        if attempt.tenant_id != tenant || attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        let rows = responses.entry(attempt_id.to_string()).or_default();
        for (question_id, answer) in answers {
            if let Some(row) = rows.iter_mut().find(|row| &row.question_id == question_id) {
                row.answer = Some(Json(answer.clone()));
            }
        }
        attempt.updated_at = at;
        Ok(true)
    }

    async fn close_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        close: CloseAttempt<'_>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Tables { attempts, responses, .. } = &mut *tables;
        let Some(attempt) = attempts.get_mut(attempt_id) else {
            return Ok(false);
        };
        if attempt.tenant_id != tenant || attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        attempt.status = close.status;
        if close.status == AttemptStatus::Submitted {
            attempt.submitted_at = Some(close.at);
        }
        attempt.updated_at = close.at;

        let mut rows = responses.remove(attempt_id).unwrap_or_default();
        for (question_id, answer) in close.answers {
            if let Some(row) = rows.iter_mut().find(|row| row.question_id == question_id) {
                row.answer = Some(Json(answer));
            }
        }
        responses.insert(attempt_id.to_string(), (close.score)(rows));
        Ok(true)
    }

    async fn grade_response(
        &self,
        tenant: &str,
        attempt_id: &str,
        question_id: &str,
        grade: &ResponseGrade,
    ) -> StoreResult<GradeWrite> {
        let mut tables = self.tables.write().await;
        let Tables { attempts, responses, .. } = &mut *tables;
        let graded = attempts
            .get(attempt_id)
            .is_some_and(|attempt| attempt.status == AttemptStatus::Graded);
        let Some(row) = responses
            .get_mut(attempt_id)
            .and_then(|rows| rows.iter_mut().find(|row| row.question_id == question_id))
            .filter(|row| row.tenant_id == tenant)
        else {
            return Ok(GradeWrite::Missing);
        };

        let unchanged = row.grading_status == GradingStatus::ManuallyGraded
            && row.awarded_score == Some(grade.score)
            && row.feedback == grade.feedback
            && row.grader_id.as_deref() == Some(grade.grader_id.as_str());
        if unchanged {
            return Ok(GradeWrite::Unchanged);
        }
        if graded {
            return Ok(GradeWrite::Locked);
        }

        row.awarded_score = Some(grade.score);
        row.feedback = grade.feedback.clone();
        row.grader_id = Some(grade.grader_id.clone());
        row.grading_status = GradingStatus::ManuallyGraded;
        row.graded_at = Some(grade.at);
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
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .responses
            .get_mut(attempt_id)
            .and_then(|rows| rows.iter_mut().find(|row| row.question_id == question_id))
            .filter(|row| row.tenant_id == tenant)
        else {
            return Ok(false);
        };
        row.suggested_score = Some(score);
        row.suggested_feedback = feedback;
        Ok(true)
    }

    async fn finalize_attempt(
        &self,
        tenant: &str,
        attempt_id: &str,
        at: PrimitiveDateTime,
    ) -> StoreResult<FinalizeOutcome> {
        let mut tables = self.tables.write().await;
        let Tables { attempts, responses, .. } = &mut *tables;
        let Some(attempt) = attempts.get_mut(attempt_id).filter(|a| a.tenant_id == tenant) else {
            return Ok(FinalizeOutcome::Missing);
        };
        if !attempt.status.is_closed() {
            return Ok(FinalizeOutcome::NotClosed);
        }

        let rows = responses.get(attempt_id).map(Vec::as_slice).unwrap_or_default();
        let result = tally(rows, attempt.max_score, attempt.passing_score);
        if result.pending > 0 {
            return Ok(FinalizeOutcome::Pending(result.pending));
        }

        let newly_finalized = attempt.finalized_at.is_none();
        attempt.status = final_status(attempt.status);
        attempt.finalized_at = attempt.finalized_at.or(Some(at));
        attempt.total_score = Some(result.total);
        attempt.percentage = Some(result.percentage);
        attempt.passed = Some(result.passed);
        attempt.updated_at = at;
        Ok(FinalizeOutcome::Finalized { attempt: attempt.clone(), newly_finalized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::GradingPolicy;
    use crate::repositories::ResponseScorer;
    use crate::test_support::test_start;

    fn attempt(id: &str, student: &str) -> QuizAttempt {
        let now = test_start();
        QuizAttempt {
            id: id.to_string(),
            tenant_id: "school-a".into(),
            quiz_id: "quiz-1".into(),
            student_id: student.to_string(),
            attempt_number: 0,
            status: AttemptStatus::InProgress,
            started_at: now,
            deadline_at: None,
            submitted_at: None,
            finalized_at: None,
            snapshot: Json(Vec::new()),
            max_score: 4.0,
            passing_score: 50.0,
            grading_policy: GradingPolicy::Hybrid,
            total_score: None,
            percentage: None,
            passed: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn response(attempt_id: &str, score: Option<f64>) -> Response {
        Response {
            tenant_id: "school-a".into(),
            attempt_id: attempt_id.to_string(),
            question_id: "q-1".into(),
            position: 0,
            answer: None,
            awarded_score: score,
            grading_status: if score.is_some() {
                GradingStatus::AutoGraded
            } else {
                GradingStatus::Pending
            },
            grader_id: None,
            feedback: None,
            graded_at: None,
            suggested_score: None,
            suggested_feedback: None,
        }
    }

    fn new_attempt(id: &str, student: &str, max_attempts: i32) -> NewAttempt {
        NewAttempt {
            attempt: attempt(id, student),
            responses: vec![response(id, None)],
            max_attempts,
        }
    }

    fn scored(score: Option<f64>) -> impl Fn(Vec<Response>) -> Vec<Response> + Send + Sync {
        move |rows| {
            rows.into_iter()
                .map(|row| Response {
                    awarded_score: score,
                    grading_status: if score.is_some() {
                        GradingStatus::AutoGraded
                    } else {
                        GradingStatus::Pending
                    },
                    ..row
                })
                .collect()
        }
    }

    fn close<'a>(status: AttemptStatus, scorer: &'a ResponseScorer<'a>) -> CloseAttempt<'a> {
        CloseAttempt { status, at: test_start(), answers: Vec::new(), score: scorer }
    }

    #[tokio::test]
    async fn one_open_attempt_per_student() {
        let store = MemoryStore::new();

        let first = store.create_attempt(new_attempt("a-1", "s-1", 3)).await.unwrap();
        assert!(matches!(first, AttemptCreation::Created(ref a) if a.attempt_number == 1));
        let second = store.create_attempt(new_attempt("a-2", "s-1", 3)).await.unwrap();
        assert!(matches!(second, AttemptCreation::ActiveExists));
        let other = store.create_attempt(new_attempt("a-3", "s-2", 3)).await.unwrap();
        assert!(matches!(other, AttemptCreation::Created(_)));
    }

    #[tokio::test]
    async fn limit_counts_closed_attempts() {
        let store = MemoryStore::new();

        store.create_attempt(new_attempt("a-1", "s-1", 1)).await.unwrap();
        let closed = store
            .close_attempt("school-a", "a-1", close(AttemptStatus::Expired, &scored(Some(0.0))))
            .await
            .unwrap();
        assert!(closed);

        let next = store.create_attempt(new_attempt("a-2", "s-1", 1)).await.unwrap();
        assert!(matches!(next, AttemptCreation::LimitReached));
    }

    #[tokio::test]
    async fn close_is_compare_and_set() {
        let store = MemoryStore::new();
        store.create_attempt(new_attempt("a-1", "s-1", 1)).await.unwrap();

        let submitted = store
            .close_attempt("school-a", "a-1", close(AttemptStatus::Submitted, &scored(Some(4.0))))
            .await
            .unwrap();
        let expired = store
            .close_attempt("school-a", "a-1", close(AttemptStatus::Expired, &scored(Some(0.0))))
            .await
            .unwrap();
        assert!(submitted);
        assert!(!expired);

        let stored = store.find_attempt("school-a", "a-1").await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Submitted);
        assert!(stored.submitted_at.is_some());
    }

    #[tokio::test]
    async fn finalize_waits_for_pending_responses() {
        let store = MemoryStore::new();
        store.create_attempt(new_attempt("a-1", "s-1", 1)).await.unwrap();

        let open = store.finalize_attempt("school-a", "a-1", test_start()).await.unwrap();
        assert!(matches!(open, FinalizeOutcome::NotClosed));

        store
            .close_attempt("school-a", "a-1", close(AttemptStatus::Submitted, &scored(None)))
            .await
            .unwrap();
        let pending = store.finalize_attempt("school-a", "a-1", test_start()).await.unwrap();
        assert!(matches!(pending, FinalizeOutcome::Pending(1)));

        let grade = ResponseGrade {
            score: 3.0,
            feedback: None,
            grader_id: "t-1".into(),
            at: test_start(),
        };
        let write = store.grade_response("school-a", "a-1", "q-1", &grade).await.unwrap();
        assert_eq!(write, GradeWrite::Applied);
        let again = store.grade_response("school-a", "a-1", "q-1", &grade).await.unwrap();
        assert_eq!(again, GradeWrite::Unchanged);

        let first = store.finalize_attempt("school-a", "a-1", test_start()).await.unwrap();
        let second = store.finalize_attempt("school-a", "a-1", test_start()).await.unwrap();
        match (first, second) {
            (
                FinalizeOutcome::Finalized { attempt, newly_finalized: true },
                FinalizeOutcome::Finalized { newly_finalized: false, .. },
            ) => {
                assert_eq!(attempt.status, AttemptStatus::Graded);
                assert_eq!(attempt.total_score, Some(3.0));
                assert_eq!(attempt.percentage, Some(75.0));
                assert_eq!(attempt.passed, Some(true));
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }

        let repeat = store.grade_response("school-a", "a-1", "q-1", &grade).await.unwrap();
        assert_eq!(repeat, GradeWrite::Unchanged);
        let regrade = ResponseGrade { score: 1.0, ..grade };
        let locked = store.grade_response("school-a", "a-1", "q-1", &regrade).await.unwrap();
        assert_eq!(locked, GradeWrite::Locked);
        let rows = store.list_responses("school-a", "a-1").await.unwrap();
        assert_eq!(rows[0].awarded_score, Some(3.0));
    }

    #[tokio::test]
    async fn close_scores_the_answers_stored_at_close_time() {
        let store = MemoryStore::new();
        store.create_attempt(new_attempt("a-1", "s-1", 1)).await.unwrap();
        let saved = vec![("q-1".to_string(), AnswerPayload::Text("late save".into()))];
        store.save_answers("school-a", "a-1", &saved, test_start()).await.unwrap();

        let seen = |rows: Vec<Response>| -> Vec<Response> {
            rows.into_iter()
                .map(|row| {
                    let answered = row.answer.is_some();
                    Response {
                        awarded_score: Some(if answered { 1.0 } else { 0.0 }),
                        grading_status: GradingStatus::AutoGraded,
                        ..row
                    }
                })
                .collect()
        };
        let closed = store
            .close_attempt("school-a", "a-1", close(AttemptStatus::Submitted, &seen))
            .await
            .unwrap();
        assert!(closed);

        let rows = store.list_responses("school-a", "a-1").await.unwrap();
        assert!(matches!(
            rows[0].answer.as_ref().map(|answer| &answer.0),
            Some(AnswerPayload::Text(text)) if text == "late save"
        ));
        assert_eq!(rows[0].awarded_score, Some(1.0));
    }

    #[tokio::test]
    async fn other_tenants_cannot_touch_rows() {
        let store = MemoryStore::new();
        store.create_attempt(new_attempt("a-1", "s-1", 1)).await.unwrap();

        assert!(store.find_attempt("school-b", "a-1").await.unwrap().is_none());
        assert!(store.list_responses("school-b", "a-1").await.unwrap().is_empty());
        let closed = store
            .close_attempt("school-b", "a-1", close(AttemptStatus::Submitted, &scored(None)))
            .await
            .unwrap();
        assert!(!closed);
        let outcome = store.finalize_attempt("school-b", "a-1", test_start()).await.unwrap();
        assert!(matches!(outcome, FinalizeOutcome::Missing));
    }
}
