pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{state::AppState, telemetry, time::Clock};
use crate::repositories::{MemoryStore, PgStore, Store};
use crate::services::essay_assist::{EssayAssist, OpenAiEssayAssist};
use crate::services::events::{self, EventBus};

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    match settings.store() {
        StoreBackend::Postgres => {
            let db_pool =
                db::init_pool(settings).await.context("Failed to connect to Postgres")?;
            db::run_migrations(&db_pool).await.context("Failed to run migrations")?;
            Ok(Arc::new(PgStore::new(db_pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let store = build_store(&settings).await?;
    let assist = OpenAiEssayAssist::from_settings(&settings)?
        .map(|assist| Arc::new(assist) as Arc<dyn EssayAssist>);
    Ok(AppState::new(settings, store, EventBus::new(), Clock::System, assist))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;
    let listener_task = events::spawn_log_listener(state.events());

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        store = state.store().backend(),
        "Gradewise API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    listener_task.abort();
    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;
    let listener_task = events::spawn_log_listener(state.events());

    tracing::info!(
        interval_seconds = state.settings().assessment().expiry_sweep_interval_seconds,
        store = state.store().backend(),
        "Gradewise worker started"
    );
    let result = tasks::scheduler::run(state).await;

    listener_task.abort();
    result?;

    Ok(())
}
