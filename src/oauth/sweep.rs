//! Background refresh sweep.

use super::manager::TokenManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Default spacing between sweeps (60 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Runs [`TokenManager::sweep`] every `period` until `shutdown` flips to
/// `true` (or its sender is dropped).
///
/// The first sweep runs immediately so tokens that expired while the
/// process was down are picked up at startup.
pub async fn run_refresh_sweep(
    manager: Arc<TokenManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = period.as_secs(), "Starting token refresh sweep");

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match manager.sweep().await {
                    Ok(report) => info!(
                        checked = report.checked,
                        due = report.due,
                        refreshed = report.refreshed,
                        failed = report.failed,
                        "Token refresh sweep complete"
                    ),
                    Err(e) => error!(error = %e, "Token refresh sweep could not list credentials"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Token refresh sweep stopped");
                    return;
                }
            }
        }
    }
}
