//! Stall detection and retry escalation.

use std::time::Duration;

use crate::error::FailureReason;
use crate::provider::FetchRequest;
use crate::types::{AssetId, Event};

use super::AssetManager;

impl AssetManager {
    /// Advance every in-flight transfer's idle timer by `elapsed`
    ///
    /// A transfer whose idle time reaches `stall_timeout` is re-issued to its
    /// provider (received chunks are kept) until `max_retries` re-issues have
    /// been made; the next stall after that fails every attached request with
    /// [`FailureReason::Stalled`]. Each transfer escalates at most one step
    /// per call, however large `elapsed` is.
    ///
    /// [`spawn_ticker`](Self::spawn_ticker) calls this periodically; callers
    /// driving their own loop may call it directly.
    pub async fn tick(&self, elapsed: Duration) {
        let stall_timeout = self.shared.config.transfer.stall_timeout;
        let max_retries = self.shared.config.transfer.max_retries;

        let mut reissue = Vec::new();
        let mut stalled = Vec::new();
        let mut failed = Vec::new();
        {
            let mut table = self.shared.table.lock().await;

            let mut exhausted: Vec<AssetId> = Vec::new();
            for (asset_id, active) in table.transfers.iter_mut() {
                if !active.transfer.advance_idle(elapsed, stall_timeout) {
                    continue;
                }

                if active.retries < max_retries {
                    active.retries += 1;
                    active.transfer.restart_wait();
                    reissue.push((
                        active.provider.clone(),
                        FetchRequest {
                            asset_id: *asset_id,
                            asset_type: active.transfer.asset_type(),
                            attempt: active.retries,
                        },
                        active.generation,
                    ));
                    stalled.push(Event::Stalled {
                        asset_id: *asset_id,
                        retry: active.retries,
                        max_retries,
                    });
                } else {
                    exhausted.push(*asset_id);
                }
            }

            for asset_id in exhausted {
                if let Some(active) = table.retire(asset_id) {
                    failed.push(active);
                }
            }
        }

        for event in stalled {
            if let Event::Stalled {
                asset_id, retry, ..
            } = &event
            {
                tracing::warn!(%asset_id, retry, max_retries, "Transfer stalled, re-issuing fetch");
            }
            self.emit_event(event);
        }

        for (provider, request, generation) in reissue {
            self.issue_fetch(provider, request, generation);
        }

        for active in failed {
            let asset_id = active.transfer.asset_id();
            let retries = active.retries;
            tracing::error!(
                %asset_id,
                retries,
                contiguous_bytes = active.transfer.contiguous_bytes(),
                total_size = ?active.transfer.total_size(),
                "Transfer stalled with retry budget exhausted"
            );
            self.finish_failed(active, FailureReason::Stalled { retries });
        }
    }
}
