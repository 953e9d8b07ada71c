use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use serde_json::json;
use time::{Date, Month, PrimitiveDateTime, Time};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState, tenant::TenantId, time::Clock};
use crate::repositories::MemoryStore;
use crate::services::essay_assist::EssayAssist;
use crate::services::events::EventBus;

pub(crate) const TEST_TENANT: &str = "school-a";
pub(crate) const OTHER_TENANT: &str = "school-b";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) clock: Clock,
    _guard: OwnedMutexGuard<()>,
}

impl TestContext {
    pub(crate) fn tenant(&self) -> TenantId {
        tenant(TEST_TENANT)
    }
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADEWISE_ENV", "test");
    std::env::set_var("GRADEWISE_STRICT_CONFIG", "0");
    std::env::set_var("GRADEWISE_STORE", "memory");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("ESSAY_ASSIST_ENABLED");
    std::env::remove_var("EXPIRY_SWEEP_INTERVAL_SECONDS");
    std::env::remove_var("DEFAULT_MAX_ATTEMPTS");
    std::env::remove_var("MAX_BULK_IMPORT_ROWS");
    std::env::remove_var("MAX_BATCH_GRADING_ITEMS");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("OPENAI_API_KEY");
    std::env::remove_var("OPENAI_BASE_URL");
}

pub(crate) fn tenant(raw: &str) -> TenantId {
    TenantId::parse(raw).expect("tenant id")
}

pub(crate) fn test_start() -> PrimitiveDateTime {
    let date = Date::from_calendar_date(2025, Month::March, 3).expect("date");
    PrimitiveDateTime::new(date, Time::from_hms(9, 0, 0).expect("time"))
}

pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_with_assist(None).await
}

pub(crate) async fn setup_test_context_with_assist(
    assist: Option<Arc<dyn EssayAssist>>,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let clock = Clock::manual(test_start());
    let state = AppState::new(
        settings,
        Arc::new(MemoryStore::new()),
        EventBus::new(),
        clock.clone(),
        assist,
    );
    let app = api::router::router(state.clone());

    TestContext { state, app, clock, _guard: guard }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    tenant: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) fn mcq_single(subject: &str, points: f64, correct: &str) -> serde_json::Value {
    json!({
        "subject": subject,
        "prompt": format!("Pick {correct}"),
        "difficulty": "easy",
        "points": points,
        "answer_key": {
            "type": "mcq_single",
            "options": [
                {"id": "A", "text": "alpha"},
                {"id": "B", "text": "beta"},
                {"id": "C", "text": "gamma"}
            ],
            "correct": correct
        }
    })
}

pub(crate) fn essay(subject: &str, points: f64) -> serde_json::Value {
    json!({
        "subject": subject,
        "prompt": "Explain photosynthesis",
        "difficulty": "hard",
        "points": points,
        "answer_key": {"type": "essay", "reference": "light to chemical energy"}
    })
}
