use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::api::router::router;
use crate::core::{config::Settings, metrics, state::AppState, time::Clock};
use crate::repositories::MemoryStore;
use crate::services::events::EventBus;
use crate::test_support::{
    self, essay, json_request, mcq_single, read_json, setup_test_context, TestContext,
    OTHER_TENANT, TEST_TENANT,
};

async fn call(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(method, uri, Some(TEST_TENANT), body))
        .await
        .expect("response");
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, Value::Null);
    }
    (status, read_json(response).await)
}

async fn create_question(ctx: &TestContext, body: Value) -> String {
    let (status, json) = call(ctx, Method::POST, "/api/v1/questions", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_str().expect("question id").to_string()
}

async fn published_quiz(ctx: &TestContext, question_ids: &[String]) -> String {
    let (status, quiz) = call(
        ctx,
        Method::POST,
        "/api/v1/quizzes",
        Some(json!({ "title": "Weekly check", "question_ids": question_ids, "max_attempts": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{quiz}");
    let quiz_id = quiz["id"].as_str().expect("quiz id").to_string();

    let (status, published) =
        call(ctx, Method::POST, &format!("/api/v1/quizzes/{quiz_id}/publish"), None).await;
    assert_eq!(status, StatusCode::OK, "{published}");
    assert_eq!(published["status"], "published");
    quiz_id
}

#[tokio::test]
async fn root_returns_message() {
    let ctx = setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["message"], "Gradewise API");
    assert_eq!(json["api_prefix"], "/api/v1");
}

#[tokio::test]
async fn healthz_reports_store_backend() {
    let ctx = setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["components"]["memory"], "healthy");
    assert_eq!(json["components"]["essay_assist"], "disabled");
}

#[tokio::test]
async fn metrics_disabled_returns_404() {
    let ctx = setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_enabled_returns_200() {
    let _guard = test_support::env_lock().await;
    test_support::set_test_env();
    std::env::set_var("PROMETHEUS_ENABLED", "1");

    let settings = Settings::load().expect("settings");
    metrics::init(&settings).expect("metrics init");
    let state = AppState::new(
        settings,
        Arc::new(MemoryStore::new()),
        EventBus::new(),
        Clock::manual(test_support::test_start()),
        None,
    );
    std::env::remove_var("PROMETHEUS_ENABLED");

    let response = router(state)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_tenant_is_unauthorized() {
    let ctx = setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/api/v1/questions", None, None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = read_json(response).await;
    assert_eq!(json["code"], "unauthorized");
    assert_eq!(json["status"], 401);
}

#[tokio::test]
async fn quiz_flow_over_http() {
    let ctx = setup_test_context().await;
    let q1 = create_question(&ctx, mcq_single("math", 4.0, "A")).await;
    let q2 = create_question(&ctx, mcq_single("math", 6.0, "C")).await;
    let quiz_id = published_quiz(&ctx, &[q1.clone(), q2.clone()]).await;

    let attempts_uri = format!("/api/v1/quizzes/{quiz_id}/attempts");
    let (status, attempt) =
        call(&ctx, Method::POST, &attempts_uri, Some(json!({ "student_id": "student-7" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{attempt}");
    assert_eq!(attempt["attempt_number"], 1);
    assert!(attempt["questions"][0].get("answer_key").is_none());
    let attempt_id = attempt["id"].as_str().expect("attempt id").to_string();

    let (status, conflict) =
        call(&ctx, Method::POST, &attempts_uri, Some(json!({ "student_id": "student-7" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "concurrent_attempt_conflict");

    let (status, saved) = call(
        &ctx,
        Method::PUT,
        &format!("/api/v1/attempts/{attempt_id}/answers"),
        Some(json!({ "answers": [{ "question_id": q1, "answer": "A" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{saved}");

    let (status, submitted) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(json!({ "answers": [{ "question_id": q2, "answer": "B" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["status"], "graded");
    assert_eq!(submitted["total_score"], 4.0);
    assert_eq!(submitted["percentage"], 40.0);
    assert_eq!(submitted["passed"], false);

    let (status, review) =
        call(&ctx, Method::GET, &format!("/api/v1/attempts/{attempt_id}/review"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["finalized"], true);
    assert_eq!(review["items"][1]["answer_key"]["correct"], "C");

    let (status, stats) =
        call(&ctx, Method::GET, &format!("/api/v1/quizzes/{quiz_id}/statistics"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["finalized"], 1);
    assert_eq!(stats["average_score"], 4.0);
}

#[tokio::test]
async fn other_tenant_gets_not_found() {
    let ctx = setup_test_context().await;
    let question_id = create_question(&ctx, mcq_single("math", 1.0, "A")).await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/v1/questions/{question_id}"),
            Some(OTHER_TENANT),
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = read_json(response).await;
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn auto_only_essay_publish_is_unprocessable() {
    let ctx = setup_test_context().await;
    let question_id = create_question(&ctx, essay("history", 5.0)).await;

    let (_, quiz) = call(
        &ctx,
        Method::POST,
        "/api/v1/quizzes",
        Some(json!({
            "title": "Essays",
            "question_ids": [question_id],
            "grading_policy": "auto_only"
        })),
    )
    .await;
    let quiz_id = quiz["id"].as_str().expect("quiz id");

    let (status, json) =
        call(&ctx, Method::POST, &format!("/api/v1/quizzes/{quiz_id}/publish"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "policy_violation");
}

#[tokio::test]
async fn short_pool_reports_bucket() {
    let ctx = setup_test_context().await;
    create_question(&ctx, mcq_single("chemistry", 1.0, "A")).await;

    let (status, pool) = call(
        &ctx,
        Method::POST,
        "/api/v1/pools",
        Some(json!({ "name": "Chem", "subject": "chemistry", "quotas": { "easy": 2 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{pool}");
    let pool_id = pool["id"].as_str().expect("pool id");

    let (status, json) =
        call(&ctx, Method::POST, &format!("/api/v1/pools/{pool_id}/generate"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "insufficient_pool");
    assert!(json["detail"].as_str().unwrap_or_default().contains("'easy'"));
}

#[tokio::test]
async fn manual_grading_over_http() {
    let ctx = setup_test_context().await;
    let question_id = create_question(&ctx, essay("history", 5.0)).await;
    let quiz_id = published_quiz(&ctx, &[question_id.clone()]).await;

    let (_, attempt) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/quizzes/{quiz_id}/attempts"),
        Some(json!({ "student_id": "student-1" })),
    )
    .await;
    let attempt_id = attempt["id"].as_str().expect("attempt id").to_string();
    let (_, submitted) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        Some(json!({ "answers": [{ "question_id": question_id, "answer": "Rome fell slowly." }] })),
    )
    .await;
    assert_eq!(submitted["status"], "submitted");

    let (status, json) =
        call(&ctx, Method::POST, &format!("/api/v1/attempts/{attempt_id}/finalize"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "grading_incomplete");

    let grade_uri = format!("/api/v1/attempts/{attempt_id}/responses/{question_id}/grade");
    let (status, json) = call(
        &ctx,
        Method::POST,
        &grade_uri,
        Some(json!({ "score": 9.0, "grader_id": "teacher-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "grading_out_of_range");

    let (status, json) = call(
        &ctx,
        Method::POST,
        &grade_uri,
        Some(json!({ "score": 4.5, "grader_id": "teacher-1", "feedback": "good" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["finalized"], true);
    assert_eq!(json["attempt_status"], "graded");
    assert_eq!(json["response"]["grading_status"], "manually_graded");

    let (status, json) = call(
        &ctx,
        Method::POST,
        &grade_uri,
        Some(json!({ "score": 1.0, "grader_id": "teacher-2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "invalid_state_transition");

    let (status, trend) =
        call(&ctx, Method::GET, "/api/v1/students/student-1/trend", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trend["latest_percentage"], 90.0);
}
