//! Chunk and pull events reported by providers.
//!
//! Every entry point resolves the transfer under the table lock, mutates it,
//! and releases the lock before delivering anything. Events for an asset with
//! no transfer (never requested, cancelled, failed or already completed) are
//! dropped. Events carrying a generation are also dropped when the asset's
//! current transfer is a newer one.

use bytes::Bytes;

use crate::error::FailureReason;
use crate::transfer::ChunkDisposition;
use crate::types::{AssetId, AssetOutcome, Event, RequestState, TransportKind};

use super::delivery::fan_out;
use super::{ActiveTransfer, AssetManager};

impl AssetManager {
    /// Forward one fragment into the asset's transfer
    ///
    /// Returns `None` if no transfer exists for `asset_id`, or if the transfer
    /// is served by a pull transport; the fragment is discarded and never
    /// creates a transfer or a chunk store.
    pub async fn on_chunk_received(
        &self,
        asset_id: AssetId,
        index: u32,
        bytes: Bytes,
        declared_total: Option<u64>,
    ) -> Option<ChunkDisposition> {
        self.accept_chunk(asset_id, None, index, bytes, declared_total)
            .await
    }

    /// Deliver a complete buffer from a pull transport
    ///
    /// Returns false if no transfer exists for `asset_id`. An empty buffer
    /// fails the transfer.
    pub async fn on_pull_complete(&self, asset_id: AssetId, buffer: Bytes) -> bool {
        self.complete_pull(asset_id, None, buffer).await
    }

    /// Report a terminal failure from a pull transport
    ///
    /// Returns false if no transfer exists for `asset_id`.
    pub async fn on_pull_failed(&self, asset_id: AssetId, reason: impl Into<String>) -> bool {
        self.fail_from_provider(asset_id, None, reason.into()).await
    }

    pub(crate) async fn accept_chunk(
        &self,
        asset_id: AssetId,
        generation: Option<u64>,
        index: u32,
        bytes: Bytes,
        declared_total: Option<u64>,
    ) -> Option<ChunkDisposition> {
        let mut table = self.shared.table.lock().await;
        let Some(active) = table.current_mut(asset_id, generation) else {
            tracing::debug!(%asset_id, index, "Dropping chunk for unknown or retired transfer");
            return None;
        };
        if active.provider.transport() == TransportKind::Pull {
            tracing::debug!(
                %asset_id,
                index,
                provider = active.provider.name(),
                "Dropping chunk for pull transfer"
            );
            return None;
        }

        let disposition = active.transfer.receive_chunk(index, bytes, declared_total);
        let progress = disposition.is_accepted().then(|| Event::Progress {
            asset_id,
            bytes_received: active.transfer.bytes_received(),
            contiguous_bytes: active.transfer.contiguous_bytes(),
            total_size: active.transfer.total_size(),
        });
        let finished = if disposition == ChunkDisposition::Completed {
            table.retire(asset_id)
        } else {
            None
        };
        drop(table);

        if let Some(event) = progress {
            self.emit_event(event);
        }
        if let Some(active) = finished {
            self.finish_assembled(active);
        }
        Some(disposition)
    }

    pub(crate) async fn complete_pull(
        &self,
        asset_id: AssetId,
        generation: Option<u64>,
        buffer: Bytes,
    ) -> bool {
        let mut table = self.shared.table.lock().await;
        if table.current_mut(asset_id, generation).is_none() {
            tracing::debug!(%asset_id, "Dropping pull result for unknown or retired transfer");
            return false;
        }
        let Some(active) = table.retire(asset_id) else {
            return false;
        };
        drop(table);

        if buffer.is_empty() {
            let provider = active.provider.name().to_string();
            tracing::warn!(%asset_id, %provider, "Pull transport returned an empty asset");
            self.finish_failed(
                active,
                FailureReason::Provider {
                    provider,
                    message: "empty asset body".to_string(),
                },
            );
        } else {
            self.finish_completed(active, buffer);
        }
        true
    }

    pub(crate) async fn fail_from_provider(
        &self,
        asset_id: AssetId,
        generation: Option<u64>,
        message: String,
    ) -> bool {
        let mut table = self.shared.table.lock().await;
        if table.current_mut(asset_id, generation).is_none() {
            tracing::debug!(%asset_id, %message, "Dropping failure for unknown or retired transfer");
            return false;
        }
        let Some(active) = table.retire(asset_id) else {
            return false;
        };
        drop(table);

        let provider = active.provider.name().to_string();
        tracing::error!(%asset_id, %provider, error = %message, "Asset transfer failed");
        self.finish_failed(active, FailureReason::Provider { provider, message });
        true
    }

    /// Record that the provider fetch has been initiated
    pub(crate) async fn mark_in_flight(&self, asset_id: AssetId, generation: u64) {
        let mut table = self.shared.table.lock().await;
        let Some(active) = table.current_mut(asset_id, Some(generation)) else {
            return;
        };

        active.issued = true;
        for waiter in &active.waiters {
            waiter.state.send_if_modified(|state| {
                if *state == RequestState::Pending {
                    *state = RequestState::InFlight;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Whether `generation` is still the live transfer for `asset_id`
    pub(crate) async fn is_current(&self, asset_id: AssetId, generation: u64) -> bool {
        let mut table = self.shared.table.lock().await;
        table.current_mut(asset_id, Some(generation)).is_some()
    }

    fn finish_assembled(&self, active: ActiveTransfer) {
        let asset_id = active.transfer.asset_id();
        match active.transfer.assemble() {
            Ok(bytes) => self.finish_completed(active, bytes),
            Err(e) => {
                tracing::error!(%asset_id, error = %e, "Reassembly failed for a ready transfer");
                let provider = active.provider.name().to_string();
                self.finish_failed(
                    active,
                    FailureReason::Provider {
                        provider,
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub(crate) fn finish_completed(&self, active: ActiveTransfer, bytes: Bytes) {
        let asset_id = active.transfer.asset_id();
        let size = bytes.len() as u64;
        let delivered = fan_out(active.waiters, &AssetOutcome::Completed(bytes));

        tracing::info!(%asset_id, size, delivered, "Asset transfer completed");
        self.emit_event(Event::Completed {
            asset_id,
            size,
            delivered,
        });
    }

    pub(crate) fn finish_failed(&self, active: ActiveTransfer, reason: FailureReason) {
        let asset_id = active.transfer.asset_id();
        let delivered = fan_out(active.waiters, &AssetOutcome::Failed(reason.clone()));

        self.emit_event(Event::Failed {
            asset_id,
            reason,
            delivered,
        });
    }
}
