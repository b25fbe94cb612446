//! Background ticker and shutdown coordination.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::FailureReason;
use crate::types::Event;

use super::AssetManager;

impl AssetManager {
    /// Spawn a task that calls [`tick`](Self::tick) every `tick_interval`
    ///
    /// Elapsed time is measured with a monotonic clock; missed ticks are
    /// skipped rather than replayed. The task holds only a weak reference to
    /// the manager and exits on [`shutdown`](Self::shutdown) or when the last
    /// manager clone is dropped.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let token = self.shared.shutdown_token.clone();
        let period = self.shared.config.tick_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = Instant::now();

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Asset ticker stopped by shutdown");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(shared) = shared.upgrade() else {
                            tracing::debug!("Asset manager dropped, ticker exiting");
                            break;
                        };
                        let now = Instant::now();
                        let elapsed = now.duration_since(last);
                        last = now;
                        AssetManager::from_shared(shared).tick(elapsed).await;
                    }
                }
            }
        })
    }

    /// Shut the manager down
    ///
    /// Stops accepting requests, stops the ticker, and delivers
    /// [`FailureReason::Shutdown`] once to every attached request. Late
    /// provider events are discarded. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.shared.accepting_new.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down asset manager");

        self.shared.shutdown_token.cancel();

        let drained: Vec<_> = {
            let mut table = self.shared.table.lock().await;
            table.requests.clear();
            table.transfers.drain().map(|(_, active)| active).collect()
        };

        let transfers = drained.len();
        for active in drained {
            self.finish_failed(active, FailureReason::Shutdown);
        }

        self.emit_event(Event::Shutdown);
        tracing::info!(abandoned_transfers = transfers, "Asset manager shut down");
    }
}
