//! Background TTL sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::engine::SyncEngine;

/// Owns the sweeper task; dropping it without [`shutdown`](Self::shutdown)
/// leaves the task running until the runtime stops.
pub struct SweeperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for an in-progress pass to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.task.await {
            warn!(error = %err, "sweeper task ended abnormally");
        }
    }
}

/// Runs [`SyncEngine::sweep_expired`] every `interval` until shut down.
///
/// The first pass runs one full interval after spawning. A failing pass is
/// logged and the loop carries on.
pub fn spawn_sweeper(engine: Arc<SyncEngine>, interval: Duration) -> SweeperHandle {
    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = signal.notified() => {
                    debug!("sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match engine.sweep_expired().await {
                        Ok(report) => debug!(?report, "sweep pass complete"),
                        Err(err) => warn!(error = %err, "sweep pass failed"),
                    }
                }
            }
        }
    });

    SweeperHandle { shutdown, task }
}
