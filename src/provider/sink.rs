//! Provider-facing handle into the manager

use std::sync::Weak;

use bytes::Bytes;

use crate::manager::{AssetManager, ManagerShared};
use crate::transfer::ChunkDisposition;
use crate::types::AssetId;

/// Whether the transfer behind a sink still wants events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkStatus {
    /// The transfer is in flight
    Open,
    /// The transfer completed, failed, was cancelled, or the manager is gone
    Closed,
}

/// Handle a provider uses to report one transfer's progress
///
/// Bound to one asset ID and one transfer generation. Holds only a weak
/// reference to the manager, so providers that keep sinks around (e.g. in a
/// routing table) never keep the manager alive. Once the transfer is retired,
/// every call is a logged no-op returning [`SinkStatus::Closed`]; a late event
/// never resurrects a transfer or leaks into a newer transfer of the same asset.
#[derive(Clone, Debug)]
pub struct TransferSink {
    manager: Weak<ManagerShared>,
    asset_id: AssetId,
    generation: u64,
}

impl TransferSink {
    pub(crate) fn new(manager: Weak<ManagerShared>, asset_id: AssetId, generation: u64) -> Self {
        Self {
            manager,
            asset_id,
            generation,
        }
    }

    /// Asset this sink reports for
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn manager(&self) -> Option<AssetManager> {
        self.manager.upgrade().map(AssetManager::from_shared)
    }

    /// Deliver one fragment; `declared_total` is set on the size-bearing fragment
    pub async fn chunk(&self, index: u32, bytes: Bytes, declared_total: Option<u64>) -> SinkStatus {
        let Some(manager) = self.manager() else {
            return SinkStatus::Closed;
        };
        match manager
            .accept_chunk(self.asset_id, Some(self.generation), index, bytes, declared_total)
            .await
        {
            None | Some(ChunkDisposition::Completed) | Some(ChunkDisposition::AlreadyReady) => {
                SinkStatus::Closed
            }
            Some(_) => SinkStatus::Open,
        }
    }

    /// Deliver the complete asset (pull transports)
    pub async fn complete(&self, buffer: Bytes) -> SinkStatus {
        if let Some(manager) = self.manager() {
            manager
                .complete_pull(self.asset_id, Some(self.generation), buffer)
                .await;
        }
        SinkStatus::Closed
    }

    /// Report a terminal failure
    pub async fn fail(&self, message: impl Into<String>) -> SinkStatus {
        if let Some(manager) = self.manager() {
            manager
                .fail_from_provider(self.asset_id, Some(self.generation), message.into())
                .await;
        }
        SinkStatus::Closed
    }

    /// Whether the transfer behind this sink is still in flight
    pub async fn is_open(&self) -> bool {
        match self.manager() {
            Some(manager) => manager.is_current(self.asset_id, self.generation).await,
            None => false,
        }
    }

    pub(crate) async fn mark_in_flight(&self) {
        if let Some(manager) = self.manager() {
            manager.mark_in_flight(self.asset_id, self.generation).await;
        }
    }
}
