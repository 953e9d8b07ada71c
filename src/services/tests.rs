use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use time::Duration;

use crate::db::answers::AnswerPayload;
use crate::db::models::{Question, Quiz};
use crate::db::types::{AttemptStatus, GradingStatus, QuizStatus};
use crate::repositories::AttemptFilter;
use crate::schemas::attempt::AnswerEntry;
use crate::schemas::grading::{BatchGradeItem, ManualGradeRequest};
use crate::schemas::pool::PoolCreate;
use crate::schemas::question::{QuestionCreate, QuestionDuplicate, QuestionUpdate};
use crate::schemas::quiz::{AddFromPoolRequest, QuizCreate};
use crate::services::errors::AssessmentError;
use crate::services::essay_assist::{EssayAssist, EssayPrompt, EssaySuggestion};
use crate::services::events::AssessmentEvent;
use crate::services::{
    attempts, grading, question_bank, question_pool, quizzes, statistics,
};
use crate::test_support::{
    self, essay, mcq_single, setup_test_context, setup_test_context_with_assist, tenant,
    TestContext, OTHER_TENANT,
};

async fn add_question(ctx: &TestContext, body: Value) -> Question {
    let payload: QuestionCreate = serde_json::from_value(body).expect("question payload");
    question_bank::create_question(&ctx.state, &ctx.tenant(), payload).await.expect("question")
}

async fn draft_quiz(ctx: &TestContext, question_ids: &[String], settings: Value) -> Quiz {
    let mut body = json!({ "title": "Unit quiz", "question_ids": question_ids });
    if let (Some(target), Some(extra)) = (body.as_object_mut(), settings.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    let payload: QuizCreate = serde_json::from_value(body).expect("quiz payload");
    quizzes::create_quiz(&ctx.state, &ctx.tenant(), payload).await.expect("quiz")
}

async fn published_quiz(ctx: &TestContext, question_ids: &[String], settings: Value) -> Quiz {
    let quiz = draft_quiz(ctx, question_ids, settings).await;
    quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &quiz.id).await.expect("publish")
}

fn answer(question: &Question, payload: AnswerPayload) -> AnswerEntry {
    AnswerEntry { question_id: question.id.clone(), answer: payload }
}

fn text(value: &str) -> AnswerPayload {
    AnswerPayload::Text(value.to_string())
}

fn grade(score: f64) -> ManualGradeRequest {
    ManualGradeRequest { score, feedback: Some("clear reasoning".into()), grader_id: "teacher-1".into() }
}

#[tokio::test]
async fn objective_quiz_is_graded_on_submit() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let q2 = add_question(&ctx, mcq_single("math", 5.0, "B")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone(), q2.id.clone()], json!({})).await;

    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    let submitted = attempts::submit_attempt(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![answer(&q1, text("A")), answer(&q2, text("C"))],
    )
    .await
    .expect("submit");

    assert_eq!(submitted.status, AttemptStatus::Graded);
    assert_eq!(submitted.total_score, Some(5.0));
    assert_eq!(submitted.max_score, 10.0);
    assert_eq!(submitted.percentage, Some(50.0));
    assert_eq!(submitted.passed, Some(true));

    let responses = attempts::list_responses(&ctx.state, &ctx.tenant(), &attempt.id)
        .await
        .expect("responses");
    let scores: Vec<Option<f64>> = responses.iter().map(|r| r.awarded_score).collect();
    assert_eq!(scores, vec![Some(5.0), Some(0.0)]);
    assert!(responses.iter().all(|r| r.grading_status == GradingStatus::AutoGraded));
}

#[tokio::test]
async fn multi_select_awards_partial_credit() {
    let ctx = setup_test_context().await;
    let question = add_question(
        &ctx,
        json!({
            "subject": "science",
            "prompt": "Which are noble gases?",
            "difficulty": "medium",
            "points": 10.0,
            "answer_key": {
                "type": "mcq_multi",
                "options": [
                    {"id": "A", "text": "Neon"},
                    {"id": "B", "text": "Argon"},
                    {"id": "C", "text": "Xenon"},
                    {"id": "D", "text": "Oxygen"}
                ],
                "correct": ["A", "B", "C"]
            }
        }),
    )
    .await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;

    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    let choices = AnswerPayload::Choices(vec!["A".into(), "B".into(), "D".into()]);
    let submitted = attempts::submit_attempt(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![answer(&question, choices)],
    )
    .await
    .expect("submit");

    assert_eq!(submitted.total_score, Some(3.33));
}

#[tokio::test]
async fn expired_attempt_counts_toward_the_limit() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(
        &ctx,
        &[q1.id.clone()],
        json!({ "max_attempts": 1, "time_limit_seconds": 60 }),
    )
    .await;

    let first = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    ctx.clock.advance(Duration::seconds(61));

    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::AttemptLimitExceeded { max_attempts: 1 }));

    let first = attempts::get_attempt(&ctx.state, &ctx.tenant(), &first.id).await.expect("get");
    assert_eq!(first.status, AttemptStatus::Expired);
    assert_eq!(first.total_score, Some(0.0));
    assert!(first.finalized_at.is_some());
}

#[tokio::test]
async fn essay_waits_for_manual_grade() {
    let ctx = setup_test_context().await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;

    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    let submitted = attempts::submit_attempt(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![answer(&question, text("Plants turn light into sugar."))],
    )
    .await
    .expect("submit");
    assert_eq!(submitted.status, AttemptStatus::Submitted);
    assert!(submitted.finalized_at.is_none());

    let err = grading::finalize_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::GradingIncomplete { pending: 1 }));

    let result =
        grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(8.0))
            .await
            .expect("grade");
    assert!(result.finalized);
    assert_eq!(result.attempt_status, AttemptStatus::Graded);

    let graded = attempts::get_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("get");
    assert_eq!(graded.status, AttemptStatus::Graded);
    assert_eq!(graded.total_score, Some(8.0));
    assert_eq!(graded.percentage, Some(80.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_admit_exactly_one() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "max_attempts": 3 })).await;

    let state_a = ctx.state.clone();
    let state_b = ctx.state.clone();
    let quiz_a = quiz.id.clone();
    let quiz_b = quiz.id.clone();
    let first = tokio::spawn(async move {
        attempts::start_attempt(&state_a, &tenant(test_support::TEST_TENANT), &quiz_a, "student-1")
            .await
    });
    let second = tokio::spawn(async move {
        attempts::start_attempt(&state_b, &tenant(test_support::TEST_TENANT), &quiz_b, "student-1")
            .await
    });
    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.expect("join"), second.expect("join")];

    let started = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(AssessmentError::ConcurrentAttemptConflict)))
        .count();
    assert_eq!(started, 1);
    assert_eq!(conflicts, 1);

    let filter = AttemptFilter {
        quiz_id: Some(quiz.id.clone()),
        status: Some(AttemptStatus::InProgress),
        ..AttemptFilter::default()
    };
    let open = ctx.state.store().list_attempts(test_support::TEST_TENANT, &filter).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn attempts_never_exceed_the_limit() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "max_attempts": 2 })).await;

    for expected_number in 1..=2 {
        let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
            .await
            .expect("start");
        assert_eq!(attempt.attempt_number, expected_number);
        attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text("A"))])
            .await
            .expect("submit");
    }

    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::AttemptLimitExceeded { max_attempts: 2 }));

    let all = attempts::list_attempts(&ctx.state, &ctx.tenant(), &quiz.id, Default::default())
        .await
        .expect("list");
    assert_eq!(all.iter().filter(|a| a.status != AttemptStatus::Expired).count(), 2);
}

#[tokio::test]
async fn second_start_while_open_is_a_conflict() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "max_attempts": 5 })).await;

    attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1").await.expect("start");
    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::ConcurrentAttemptConflict));
    assert!(err.is_retryable());

    attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-2")
        .await
        .expect("other student starts");
}

#[tokio::test]
async fn repeated_manual_grade_is_idempotent() {
    let ctx = setup_test_context().await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, Vec::new())
        .await
        .expect("submit");

    let mut events = ctx.state.events().subscribe();
    let first =
        grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(6.5))
            .await
            .expect("first grade");
    ctx.clock.advance(Duration::minutes(5));
    let second =
        grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(6.5))
            .await
            .expect("second grade");

    assert_eq!(first.response.awarded_score, second.response.awarded_score);
    assert_eq!(first.response.grader_id, second.response.grader_id);
    assert_eq!(first.response.graded_at, second.response.graded_at);
    assert_eq!(second.response.grading_status, GradingStatus::ManuallyGraded);

    let event = events.try_recv().expect("graded event");
    assert!(matches!(event, AssessmentEvent::AttemptGraded { total_score, .. } if total_score == 6.5));
    assert!(events.try_recv().is_err(), "AttemptGraded is emitted once");
}

#[tokio::test]
async fn graded_attempt_keeps_its_grades() {
    let ctx = setup_test_context_with_assist(Some(Arc::new(FixedAssist))).await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    attempts::submit_attempt(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![answer(&question, text("Light becomes sugar."))],
    )
    .await
    .expect("submit");
    grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(8.0))
        .await
        .expect("grade");

    let err = grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));
    let repeat =
        grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(8.0))
            .await
            .expect("identical grade is a no-op");
    assert_eq!(repeat.attempt_status, AttemptStatus::Graded);

    let report = grading::batch_grade(
        &ctx.state,
        &ctx.tenant(),
        vec![BatchGradeItem {
            attempt_id: attempt.id.clone(),
            question_id: question.id.clone(),
            score: 1.0,
            feedback: None,
            grader_id: "teacher-2".into(),
        }],
    )
    .await
    .expect("batch");
    assert_eq!(report.failed, 1);
    assert_eq!(report.results[0].error.as_ref().map(|e| e.code), Some("invalid_state_transition"));

    let err = grading::suggest_essay_score(&ctx.state, &ctx.tenant(), &attempt.id, &question.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));

    let graded = attempts::get_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("get");
    assert_eq!(graded.status, AttemptStatus::Graded);
    assert_eq!(graded.total_score, Some(8.0));
    let responses =
        attempts::list_responses(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("responses");
    assert_eq!(responses[0].awarded_score, Some(8.0));
    assert_eq!(responses[0].grader_id.as_deref(), Some("teacher-1"));
    assert_eq!(responses[0].suggested_score, None);
}

#[tokio::test]
async fn expired_attempt_stays_gradable() {
    let ctx = setup_test_context().await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({ "time_limit_seconds": 60 })).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    ctx.clock.advance(Duration::minutes(5));

    let result =
        grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(4.0))
            .await
            .expect("grade expired attempt");
    assert!(result.finalized);
    assert_eq!(result.attempt_status, AttemptStatus::Expired);
}

#[tokio::test]
async fn manual_grade_rejects_out_of_range_scores() {
    let ctx = setup_test_context().await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");

    let err = grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));

    attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, Vec::new())
        .await
        .expect("submit");
    for score in [-1.0, 10.5] {
        let err =
            grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &question.id, grade(score))
                .await
                .unwrap_err();
        assert!(matches!(err, AssessmentError::GradingOutOfRange { max, .. } if max == 10.0));
    }
}

#[tokio::test]
async fn batch_grading_reports_each_item() {
    let ctx = setup_test_context().await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({ "max_attempts": 1 })).await;

    let mut attempt_ids = Vec::new();
    for student in ["s1", "s2"] {
        let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, student)
            .await
            .expect("start");
        attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, Vec::new())
            .await
            .expect("submit");
        attempt_ids.push(attempt.id);
    }

    let item = |attempt_id: &str, score: f64| BatchGradeItem {
        attempt_id: attempt_id.to_string(),
        question_id: question.id.clone(),
        score,
        feedback: None,
        grader_id: "teacher-1".into(),
    };
    let report = grading::batch_grade(
        &ctx.state,
        &ctx.tenant(),
        vec![item(&attempt_ids[0], 7.0), item(&attempt_ids[1], 42.0), item("missing", 1.0)],
    )
    .await
    .expect("batch");

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.results[0].attempt_status, Some(AttemptStatus::Graded));
    assert_eq!(report.results[1].error.as_ref().map(|e| e.code), Some("grading_out_of_range"));
    assert_eq!(report.results[2].error.as_ref().map(|e| e.code), Some("not_found"));

    let untouched = attempts::get_attempt(&ctx.state, &ctx.tenant(), &attempt_ids[1])
        .await
        .expect("get");
    assert_eq!(untouched.status, AttemptStatus::Submitted);
}

#[tokio::test]
async fn duplicate_keeps_content_under_new_id() {
    let ctx = setup_test_context().await;
    let original = add_question(&ctx, mcq_single("math", 3.0, "B")).await;

    let copy = question_bank::duplicate_question(
        &ctx.state,
        &ctx.tenant(),
        &original.id,
        QuestionDuplicate::default(),
    )
    .await
    .expect("duplicate");
    let fetched =
        question_bank::get_question(&ctx.state, &ctx.tenant(), &copy.id).await.expect("fetch");

    assert_ne!(fetched.id, original.id);
    assert_eq!(fetched.question_type, original.question_type);
    assert_eq!(fetched.difficulty, original.difficulty);
    assert_eq!(fetched.answer_key, original.answer_key);
    assert_eq!(fetched.points, original.points);
}

#[tokio::test]
async fn short_pool_bucket_fails_without_a_record() {
    let ctx = setup_test_context().await;
    for _ in 0..3 {
        add_question(&ctx, mcq_single("math", 1.0, "A")).await;
    }
    let payload: PoolCreate = serde_json::from_value(json!({
        "name": "Easy math",
        "subject": "math",
        "quotas": { "easy": 5 }
    }))
    .expect("pool payload");
    let pool = question_pool::create_pool(&ctx.state, &ctx.tenant(), payload).await.expect("pool");

    let err = question_pool::generate(&ctx.state, &ctx.tenant(), &pool.id, None, None)
        .await
        .unwrap_err();
    match err {
        AssessmentError::InsufficientPool { bucket, requested, available } => {
            assert_eq!(bucket, "easy");
            assert_eq!(requested, 5);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let generations = ctx
        .state
        .store()
        .list_generations(test_support::TEST_TENANT, &pool.id, None)
        .await
        .expect("generations");
    assert!(generations.is_empty());
}

#[tokio::test]
async fn pool_without_repeats_draws_fresh_questions_per_quiz() {
    let ctx = setup_test_context().await;
    for _ in 0..4 {
        add_question(&ctx, mcq_single("math", 1.0, "A")).await;
    }
    let payload: PoolCreate = serde_json::from_value(json!({
        "name": "Easy math",
        "subject": "math",
        "quotas": { "easy": 2 },
        "allow_repeat": false
    }))
    .expect("pool payload");
    let pool = question_pool::create_pool(&ctx.state, &ctx.tenant(), payload).await.expect("pool");
    let quiz = draft_quiz(&ctx, &[], json!({})).await;

    let request = || AddFromPoolRequest { pool_id: pool.id.clone(), requested_total: None };
    let (_, first) = quizzes::add_questions_from_pool(&ctx.state, &ctx.tenant(), &quiz.id, request())
        .await
        .expect("first draw");
    let (quiz, second) =
        quizzes::add_questions_from_pool(&ctx.state, &ctx.tenant(), &quiz.id, request())
            .await
            .expect("second draw");

    assert_eq!(first.question_ids.len(), 2);
    assert_eq!(second.question_ids.len(), 2);
    assert!(second.question_ids.iter().all(|id| !first.question_ids.contains(id)));
    assert_eq!(quiz.question_ids.len(), 4);

    let err = quizzes::add_questions_from_pool(&ctx.state, &ctx.tenant(), &quiz.id, request())
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InsufficientPool { available: 0, .. }));
}

#[tokio::test]
async fn auto_only_quiz_cannot_publish_essays() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let q2 = add_question(&ctx, essay("math", 5.0)).await;
    let quiz =
        draft_quiz(&ctx, &[q1.id.clone(), q2.id.clone()], json!({ "grading_policy": "auto_only" }))
            .await;

    let err = quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &quiz.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::PolicyViolation(_)));

    let empty = draft_quiz(&ctx, &[], json!({})).await;
    let err = quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &empty.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Validation(_)));
}

#[tokio::test]
async fn lifecycle_only_moves_forward() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let draft = draft_quiz(&ctx, &[q1.id.clone()], json!({})).await;

    let err = quizzes::archive_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));
    let err = quizzes::clone_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));

    let published = quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.expect("publish");
    assert!(published.published_at.is_some());
    let err = quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));
    let err = quizzes::delete_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));

    let clone = quizzes::clone_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.expect("clone");
    assert_eq!(clone.status, QuizStatus::Draft);
    assert_eq!(clone.cloned_from.as_deref(), Some(draft.id.as_str()));
    assert_eq!(clone.question_ids, published.question_ids);

    let archived = quizzes::archive_quiz(&ctx.state, &ctx.tenant(), &draft.id).await.expect("archive");
    assert_eq!(archived.status, QuizStatus::Archived);
    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &draft.id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn late_submit_loses_to_expiry() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "time_limit_seconds": 30 })).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");

    attempts::save_answers(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text("A"))])
        .await
        .expect("auto-save");
    ctx.clock.advance(Duration::seconds(30));

    let err = attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(_)));

    let expired = attempts::get_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("get");
    assert_eq!(expired.status, AttemptStatus::Expired);
    assert!(expired.submitted_at.is_none());
    assert_eq!(expired.total_score, Some(5.0), "saved answers are graded on expiry");
}

#[tokio::test]
async fn sweep_expires_overdue_attempts_once() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "time_limit_seconds": 60 })).await;
    for student in ["s1", "s2"] {
        attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, student).await.expect("start");
    }

    assert_eq!(attempts::expire_overdue(&ctx.state, 100).await.expect("sweep"), 0);
    ctx.clock.advance(Duration::minutes(2));
    assert_eq!(attempts::expire_overdue(&ctx.state, 100).await.expect("sweep"), 2);
    assert_eq!(attempts::expire_overdue(&ctx.state, 100).await.expect("sweep"), 0);
}

#[tokio::test]
async fn snapshot_ignores_later_question_edits() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");

    let update: QuestionUpdate = serde_json::from_value(json!({
        "points": 50.0,
        "answer_key": {
            "type": "mcq_single",
            "options": [{"id": "A", "text": "alpha"}, {"id": "B", "text": "beta"}],
            "correct": "B"
        }
    }))
    .expect("update payload");
    question_bank::update_question(&ctx.state, &ctx.tenant(), &q1.id, update).await.expect("update");

    let submitted =
        attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text("A"))])
            .await
            .expect("submit");
    assert_eq!(submitted.total_score, Some(5.0));
    assert_eq!(submitted.max_score, 5.0);
}

#[tokio::test]
async fn other_tenants_see_nothing() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    let other = tenant(OTHER_TENANT);

    let err = question_bank::get_question(&ctx.state, &other, &q1.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::NotFound { .. }));
    let err = question_bank::delete_question(&ctx.state, &other, &q1.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::NotFound { .. }));
    let err = attempts::start_attempt(&ctx.state, &other, &quiz.id, "student-1").await.unwrap_err();
    assert!(matches!(err, AssessmentError::NotFound { .. }));
    let err = attempts::submit_attempt(&ctx.state, &other, &attempt.id, Vec::new()).await.unwrap_err();
    assert!(matches!(err, AssessmentError::NotFound { .. }));
}

#[tokio::test]
async fn bulk_import_keeps_good_rows() {
    let ctx = setup_test_context().await;
    let rows = vec![
        mcq_single("math", 2.0, "A"),
        json!({ "subject": "math", "prompt": "No key", "difficulty": "easy", "points": 1.0 }),
        mcq_single("math", 2.0, "Z"),
        essay("history", 4.0),
    ];

    let report = question_bank::bulk_import(&ctx.state, &ctx.tenant(), rows).await.expect("import");
    assert_eq!(report.total, 4);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 2);
    let failed: Vec<usize> = report.errors.iter().map(|e| e.index).collect();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(report.errors[0].prompt.as_deref(), Some("No key"));

    let stats = question_bank::statistics(&ctx.state, &ctx.tenant()).await.expect("stats");
    assert_eq!(stats.total_questions, 2);
    assert_eq!(stats.auto_gradable_questions, 1);
    assert_eq!(stats.by_type.get("essay"), Some(&1));
}

#[tokio::test]
async fn review_hides_keys_until_final() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let q2 = add_question(&ctx, essay("math", 5.0)).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone(), q2.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text("A"))])
        .await
        .expect("submit");

    let review = attempts::review_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("review");
    assert!(!review.finalized);
    assert!(review.items.iter().all(|item| item.answer_key.is_none()));

    let summary =
        attempts::attempt_summary(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("summary");
    assert_eq!(summary.graded_responses, 1);
    assert_eq!(summary.pending_responses, 1);
    assert_eq!(summary.total_score, 5.0);

    grading::manual_grade(&ctx.state, &ctx.tenant(), &attempt.id, &q2.id, grade(2.0))
        .await
        .expect("grade");
    let review = attempts::review_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("review");
    assert!(review.finalized);
    assert!(review.items.iter().all(|item| item.answer_key.is_some()));
    assert_eq!(review.total_score, Some(7.0));
}

#[tokio::test]
async fn statistics_separate_final_and_pending_attempts() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let q2 = add_question(&ctx, essay("math", 5.0)).await;
    let objective = published_quiz(&ctx, &[q1.id.clone()], json!({ "max_attempts": 3 })).await;
    let mixed = published_quiz(&ctx, &[q1.id.clone(), q2.id.clone()], json!({})).await;

    for (student, choice) in [("s1", "A"), ("s2", "B")] {
        let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &objective.id, student)
            .await
            .expect("start");
        attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text(choice))])
            .await
            .expect("submit");
    }
    attempts::start_attempt(&ctx.state, &ctx.tenant(), &objective.id, "s3").await.expect("start");

    let stats =
        statistics::quiz_statistics(&ctx.state, &ctx.tenant(), &objective.id).await.expect("stats");
    assert_eq!(stats.started, 3);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.graded, 2);
    assert_eq!(stats.finalized, 2);
    assert_eq!(stats.completion_rate, 0.6667);
    assert_eq!(stats.average_score, Some(2.5));
    assert_eq!(stats.pass_rate, Some(0.5));
    assert_eq!(stats.questions.len(), 1);
    assert_eq!(stats.questions[0].difficulty_index, Some(0.5));

    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &mixed.id, "s1")
        .await
        .expect("start");
    attempts::submit_attempt(&ctx.state, &ctx.tenant(), &attempt.id, vec![answer(&q1, text("A"))])
        .await
        .expect("submit");
    let stats = statistics::quiz_statistics(&ctx.state, &ctx.tenant(), &mixed.id).await.expect("stats");
    assert_eq!(stats.pending_review, 1);
    assert_eq!(stats.finalized, 0);
    assert_eq!(stats.average_score, None);

    let trend = statistics::student_trend(&ctx.state, &ctx.tenant(), "s1").await.expect("trend");
    assert_eq!(trend.points.len(), 1);
    assert_eq!(trend.latest_percentage, Some(100.0));
    assert_eq!(trend.delta, Some(0.0));
}

struct FixedAssist;

#[async_trait]
impl EssayAssist for FixedAssist {
    async fn suggest(&self, prompt: &EssayPrompt) -> anyhow::Result<EssaySuggestion> {
        Ok(EssaySuggestion { score: prompt.max_score + 3.0, feedback: Some("solid".into()) })
    }
}

#[tokio::test]
async fn essay_suggestions_stay_advisory() {
    let ctx = test_support::setup_test_context_with_assist(Some(Arc::new(FixedAssist))).await;
    let question = add_question(&ctx, essay("biology", 10.0)).await;
    let quiz = published_quiz(&ctx, &[question.id.clone()], json!({})).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    attempts::submit_attempt(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![answer(&question, text("Chlorophyll absorbs light."))],
    )
    .await
    .expect("submit");

    let suggestion =
        grading::suggest_essay_score(&ctx.state, &ctx.tenant(), &attempt.id, &question.id)
            .await
            .expect("suggestion");
    assert_eq!(suggestion.suggested_score, 10.0);

    let responses =
        attempts::list_responses(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("responses");
    assert_eq!(responses[0].grading_status, GradingStatus::Pending);
    assert_eq!(responses[0].suggested_score, Some(10.0));
    assert_eq!(responses[0].awarded_score, None);
}

#[tokio::test]
async fn bulk_reads_expire_overdue_attempts() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(&ctx, &[q1.id.clone()], json!({ "time_limit_seconds": 60 })).await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");
    ctx.clock.advance(Duration::hours(1));

    let stats =
        statistics::quiz_statistics(&ctx.state, &ctx.tenant(), &quiz.id).await.expect("stats");
    assert_eq!(stats.in_progress, 0);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.completion_rate, 1.0);
    assert_eq!(stats.finalized, 1);

    let open = attempts::list_attempts(
        &ctx.state,
        &ctx.tenant(),
        &quiz.id,
        serde_json::from_value(json!({ "status": "in_progress" })).expect("params"),
    )
    .await
    .expect("list");
    assert!(open.is_empty());

    let stored = attempts::load_attempt(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("load");
    assert_eq!(stored.status, AttemptStatus::Expired);
}

#[tokio::test]
async fn starts_respect_the_availability_window() {
    let ctx = setup_test_context().await;
    let q1 = add_question(&ctx, mcq_single("math", 5.0, "A")).await;
    let quiz = published_quiz(
        &ctx,
        &[q1.id.clone()],
        json!({
            "available_from": "2025-03-03T10:00:00Z",
            "available_until": "2025-03-03T12:00:00+00:00",
            "max_attempts": 3
        }),
    )
    .await;

    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(ref msg) if msg.contains("opens")));

    ctx.clock.advance(Duration::hours(1));
    attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start inside the window");

    ctx.clock.advance(Duration::hours(3));
    let err = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-2")
        .await
        .unwrap_err();
    assert!(matches!(err, AssessmentError::InvalidStateTransition(ref msg) if msg.contains("closed")));
}

#[tokio::test]
async fn inverted_availability_window_is_rejected() {
    let ctx = setup_test_context().await;
    let payload: QuizCreate = serde_json::from_value(json!({
        "title": "Backwards",
        "available_from": "2025-03-04T10:00:00Z",
        "available_until": "2025-03-03T10:00:00Z"
    }))
    .expect("quiz payload");

    let err = quizzes::create_quiz(&ctx.state, &ctx.tenant(), payload).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Validation(_)));
}

#[tokio::test]
async fn attempts_draw_their_own_question_subset() {
    let ctx = setup_test_context().await;
    let mut ids = Vec::new();
    for correct in ["A", "B", "A", "B", "A"] {
        ids.push(add_question(&ctx, mcq_single("math", 2.0, correct)).await.id);
    }

    let too_many = draft_quiz(&ctx, &ids, json!({ "questions_to_show": 6 })).await;
    let err = quizzes::publish_quiz(&ctx.state, &ctx.tenant(), &too_many.id).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Validation(_)));

    let quiz = published_quiz(
        &ctx,
        &ids,
        json!({ "randomize_questions": true, "questions_to_show": 3 }),
    )
    .await;
    let attempt = attempts::start_attempt(&ctx.state, &ctx.tenant(), &quiz.id, "student-1")
        .await
        .expect("start");

    assert_eq!(attempt.snapshot.len(), 3);
    assert_eq!(attempt.max_score, 6.0);
    let positions: Vec<i32> = attempt.snapshot.iter().map(|item| item.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert!(attempt.snapshot.iter().all(|item| ids.contains(&item.question_id)));

    let responses =
        attempts::list_responses(&ctx.state, &ctx.tenant(), &attempt.id).await.expect("responses");
    assert_eq!(responses.len(), 3);
    let extra = ids
        .iter()
        .find(|id| attempt.snapshot_question(id).is_none())
        .expect("a question left out of the attempt");
    let err = attempts::save_answers(
        &ctx.state,
        &ctx.tenant(),
        &attempt.id,
        vec![AnswerEntry { question_id: extra.clone(), answer: text("A") }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssessmentError::Validation(_)));
}
