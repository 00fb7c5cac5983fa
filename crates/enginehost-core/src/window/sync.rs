//! Periodic geometry reconciliation while the engine is running.

use super::embedder::WindowEmbedder;
use crate::cancel::CancellationToken;
use crate::lifecycle::LifecycleState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Background task that keeps the embedded window filling its host.
///
/// Ticks only act while the lifecycle state is `Running`. A failed tick is
/// logged and retried on the next one.
pub struct PositionSynchronizer {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PositionSynchronizer {
    pub fn start(
        embedder: Arc<WindowEmbedder>,
        interval: Duration,
        state: watch::Receiver<LifecycleState>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(embedder, interval, state, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop ticking and wait for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Position synchronizer task failed: {}", e);
            }
        }
    }
}

impl Drop for PositionSynchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    embedder: Arc<WindowEmbedder>,
    interval: Duration,
    state: watch::Receiver<LifecycleState>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the embed just fitted the window.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if *state.borrow() != LifecycleState::Running {
                    continue;
                }
                match embedder.reconcile() {
                    Ok(true) => debug!("Position sync corrected drift"),
                    Ok(false) => {}
                    Err(e) => warn!("Position sync tick failed: {}", e),
                }
            }
        }
    }
    debug!("Position synchronizer stopped");
}
