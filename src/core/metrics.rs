use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const ATTEMPTS_STARTED: &str = "attempts_started_total";
pub(crate) const ATTEMPTS_SUBMITTED: &str = "attempts_submitted_total";
pub(crate) const ATTEMPTS_EXPIRED: &str = "attempts_expired_total";
pub(crate) const ATTEMPTS_FINALIZED: &str = "attempts_finalized_total";
pub(crate) const RESPONSES_MANUALLY_GRADED: &str = "responses_manually_graded_total";
pub(crate) const QUESTIONS_IMPORTED: &str = "questions_imported_total";
pub(crate) const POOL_GENERATIONS: &str = "pool_generations_total";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Bumps a domain counter labelled with the tenant it happened in.
pub(crate) fn count(name: &'static str, tenant: &str) {
    metrics::counter!(name, "tenant" => tenant.to_string()).increment(1);
}

pub(crate) fn count_by(name: &'static str, tenant: &str, amount: u64) {
    if amount == 0 {
        return;
    }
    metrics::counter!(name, "tenant" => tenant.to_string()).increment(amount);
}

fn describe() {
    metrics::describe_counter!(ATTEMPTS_STARTED, "Quiz attempts started");
    metrics::describe_counter!(ATTEMPTS_SUBMITTED, "Quiz attempts submitted interactively");
    metrics::describe_counter!(ATTEMPTS_EXPIRED, "Quiz attempts closed by the time limit");
    metrics::describe_counter!(ATTEMPTS_FINALIZED, "Quiz attempts with every response scored");
    metrics::describe_counter!(RESPONSES_MANUALLY_GRADED, "Manual grading writes");
    metrics::describe_counter!(QUESTIONS_IMPORTED, "Questions created by bulk import");
    metrics::describe_counter!(POOL_GENERATIONS, "Successful pool draws");
}
