//! Scheduled automatic sync
//!
//! Runs a partial pass on daemon start and then on a fixed interval, and
//! applies the retention window to the sync log after each scheduled
//! pass. A tick that lands while a pass is running is skipped; the
//! at-most-one-job gate belongs to [`crate::engine::JobTracker`].

use pgs_common::db::{sync_log, SyncSource, SyncType};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::engine::{self, SyncRequest};
use crate::AppState;

pub async fn run(state: AppState) {
    let auto = state.config.auto_sync.clone();
    if !auto.enabled {
        info!("Automatic sync disabled by configuration");
        return;
    }

    let period = std::time::Duration::from_secs(auto.interval_secs.max(60));
    info!("Automatic sync every {}s", period.as_secs());

    // Initial pass right after startup, attributed to the daemon itself
    run_scheduled_pass(&state, SyncSource::Automatic, auto.retention_days).await;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately; the initial pass covered it

    loop {
        ticker.tick().await;
        run_scheduled_pass(&state, SyncSource::Cron, auto.retention_days).await;
    }
}

async fn run_scheduled_pass(state: &AppState, source: SyncSource, retention_days: u32) {
    let request = SyncRequest {
        sync_type: SyncType::Partial,
        source,
        procedure_api_id: None,
    };

    match engine::launch(state, request).await {
        Some(handle) => {
            if let Err(e) = handle.await {
                error!("Scheduled sync task panicked: {e}");
            }
            match sync_log::cleanup_older_than(&state.db, retention_days).await {
                Ok(0) => {}
                Ok(n) => info!("Retention cleanup removed {n} old sync log entries"),
                Err(e) => warn!("Retention cleanup failed: {e}"),
            }
        }
        None => info!("Sync already running, skipping scheduled pass"),
    }
}
