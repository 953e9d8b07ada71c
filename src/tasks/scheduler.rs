use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown;
use crate::core::state::AppState;
use crate::services::attempts;

const EXPIRY_BATCH_SIZE: i64 = 200;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let shutdown_rx = shutdown::watch_shutdown();
    let sweep = tokio::spawn(expire_overdue_loop(state, shutdown_rx.clone()));

    shutdown::wait_for(shutdown_rx).await;
    if let Err(err) = sweep.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

/// Closes attempts whose time limit has run out, in batches, until none are left.
pub(crate) async fn expire_overdue_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().assessment().expiry_sweep_interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => sweep(&state).await,
        }
    }
    tracing::info!("Expiry sweep stopped");
}

async fn sweep(state: &AppState) {
    loop {
        match attempts::expire_overdue(state, EXPIRY_BATCH_SIZE).await {
            Ok(expired) if expired as i64 >= EXPIRY_BATCH_SIZE => continue,
            Ok(0) => break,
            Ok(expired) => {
                tracing::info!(expired, "Expiry sweep closed overdue attempts");
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "expire_overdue failed");
                break;
            }
        }
    }
}
