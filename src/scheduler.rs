//! Periodic "ingest everything" trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::coordinator::{RunCoordinator, RunRequest};
use crate::models::RunStatus;

/// Spawn the interval task. `None` when `interval_minutes` is 0.
pub fn spawn_scheduler(
    coordinator: Arc<RunCoordinator>,
    interval_minutes: u64,
) -> Option<JoinHandle<()>> {
    if interval_minutes == 0 {
        return None;
    }
    info!(interval_minutes, "scheduler started");
    Some(tokio::spawn(run_every(
        coordinator,
        Duration::from_secs(interval_minutes * 60),
    )))
}

async fn run_every(coordinator: Arc<RunCoordinator>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // first tick fires immediately

    loop {
        interval.tick().await;
        match coordinator.run_guarded(&RunRequest::all()).await {
            RunStatus::Locked { .. } => debug!("scheduled ingest skipped, lock held"),
            RunStatus::Finished { results } => info!(
                processed = results.processed.len(),
                skipped = results.skipped.len(),
                errors = results.errors.len(),
                "scheduled ingest finished"
            ),
            // Already logged by the coordinator.
            RunStatus::Error { .. } => {}
        }
    }
}
