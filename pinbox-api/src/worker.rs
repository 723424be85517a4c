use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::fulfillment::run_full_sweep;
use crate::state::AppState;

/// Runs a full delivery sweep every `interval_secs` until the process exits.
pub async fn start_delivery_worker(state: AppState, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Delivery worker started, sweeping every {}s", interval_secs);

    loop {
        ticker.tick().await;
        match run_full_sweep(&state).await {
            Ok(Some(report)) => info!(
                "Background sweep: {} checked, {} updated, {} failed",
                report.checked, report.updated, report.failed
            ),
            Ok(None) => {}
            Err(e) => error!("Background sweep failed: {:?}", e),
        }
    }
}
