//! In-progress fetch of a single asset
//!
//! A [`Transfer`] owns the [`ChunkStore`] for one asset and runs the
//! reassembly state machine:
//!
//! ```text
//! AwaitingHeader ──(chunk carrying size)──▶ Receiving ──(prefix == size)──▶ Ready
//!        │                                     │
//!        └──(data chunk: stored, no change)    └──(idle ≥ threshold)──▶ stalled flag
//! ```
//!
//! Readiness is evaluated after every accepted chunk, so there is no latency
//! between the last byte arriving and the transfer becoming ready. The stalled
//! flag is advisory: the manager's retry policy reads it, and the next accepted
//! chunk clears it.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk_store::{ChunkStore, PutOutcome};
use crate::error::AssembleError;
use crate::types::{AssetId, AssetType};

/// Reassembly state of a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Total size not yet known
    AwaitingHeader,
    /// Total size known, prefix incomplete
    Receiving,
    /// Contiguous prefix equals the declared size (terminal)
    Ready,
}

/// What happened to a chunk handed to [`Transfer::receive_chunk`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkDisposition {
    /// Stored; transfer still incomplete
    Accepted,
    /// Stored, and the transfer just became ready
    Completed,
    /// Index already filled; payload dropped
    Duplicate,
    /// Zero-length payload; rejected
    Empty,
    /// Payload would push received bytes past the declared size; rejected
    Overflow,
    /// Transfer was already ready; payload ignored
    AlreadyReady,
}

impl ChunkDisposition {
    /// Whether the chunk's bytes were stored
    pub fn is_accepted(&self) -> bool {
        matches!(self, ChunkDisposition::Accepted | ChunkDisposition::Completed)
    }
}

/// One in-progress asset fetch
#[derive(Debug)]
pub struct Transfer {
    asset_id: AssetId,
    asset_type: AssetType,
    state: TransferState,
    total_size: Option<u64>,
    bytes_received: u64,
    idle: Duration,
    stalled: bool,
    /// Created lazily; pull transfers never allocate one
    chunks: Option<ChunkStore>,
    started_at: DateTime<Utc>,
}

impl Transfer {
    /// Create a transfer awaiting its header
    pub fn new(asset_id: AssetId, asset_type: AssetType) -> Self {
        Self {
            asset_id,
            asset_type,
            state: TransferState::AwaitingHeader,
            total_size: None,
            bytes_received: 0,
            idle: Duration::ZERO,
            stalled: false,
            chunks: None,
            started_at: Utc::now(),
        }
    }

    /// Accept one chunk, optionally carrying the declared total size
    pub fn receive_chunk(
        &mut self,
        index: u32,
        bytes: Bytes,
        declared_total: Option<u64>,
    ) -> ChunkDisposition {
        if self.state == TransferState::Ready {
            tracing::debug!(
                asset_id = %self.asset_id,
                index,
                "Chunk arrived after transfer became ready, ignoring"
            );
            return ChunkDisposition::AlreadyReady;
        }

        if bytes.is_empty() {
            tracing::warn!(
                asset_id = %self.asset_id,
                index,
                "Rejecting zero-length chunk"
            );
            return ChunkDisposition::Empty;
        }

        let header_applied = declared_total.is_some_and(|total| self.apply_header(total));

        let store = self.chunks.get_or_insert_with(ChunkStore::new);
        if let Some(total) = self.total_size {
            let len = bytes.len() as u64;
            if !store.contains(index) && self.bytes_received + len > total {
                tracing::warn!(
                    asset_id = %self.asset_id,
                    index,
                    len,
                    bytes_received = self.bytes_received,
                    total_size = total,
                    "Chunk would exceed declared asset size, dropping"
                );
                return ChunkDisposition::Overflow;
            }
        }

        let len = bytes.len() as u64;
        match store.put(index, bytes) {
            PutOutcome::Stored => {
                self.bytes_received += len;
                self.idle = Duration::ZERO;
                self.stalled = false;
                if self.evaluate_ready() {
                    ChunkDisposition::Completed
                } else {
                    ChunkDisposition::Accepted
                }
            }
            PutOutcome::Duplicate => {
                if header_applied && self.evaluate_ready() {
                    return ChunkDisposition::Completed;
                }
                ChunkDisposition::Duplicate
            }
            PutOutcome::Empty => ChunkDisposition::Empty,
        }
    }

    /// Record the declared size; returns true if it was newly learned
    fn apply_header(&mut self, total: u64) -> bool {
        if total == 0 {
            tracing::warn!(
                asset_id = %self.asset_id,
                "Ignoring header declaring zero asset size"
            );
            return false;
        }

        match self.total_size {
            None => {
                // bytes_received must never exceed total_size
                if self.bytes_received > total {
                    tracing::warn!(
                        asset_id = %self.asset_id,
                        bytes_received = self.bytes_received,
                        total_size = total,
                        "Rejecting header declaring fewer bytes than already received"
                    );
                    return false;
                }
                self.total_size = Some(total);
                self.state = TransferState::Receiving;
                tracing::debug!(asset_id = %self.asset_id, total_size = total, "Asset size known");
                true
            }
            Some(existing) if existing != total => {
                tracing::warn!(
                    asset_id = %self.asset_id,
                    existing,
                    declared = total,
                    "Conflicting size header, keeping the first"
                );
                false
            }
            Some(_) => false,
        }
    }

    fn evaluate_ready(&mut self) -> bool {
        let Some(total) = self.total_size else {
            return false;
        };
        if self.contiguous_bytes() == total {
            self.state = TransferState::Ready;
            true
        } else {
            false
        }
    }

    /// Advance the idle timer; returns true if the transfer is now stalled
    pub fn advance_idle(&mut self, elapsed: Duration, stall_timeout: Duration) -> bool {
        if self.state == TransferState::Ready {
            return false;
        }
        self.idle = self.idle.saturating_add(elapsed);
        if self.idle >= stall_timeout {
            self.stalled = true;
            true
        } else {
            false
        }
    }

    /// Restart the stall wait after a retry; received chunks are kept
    pub fn restart_wait(&mut self) {
        self.idle = Duration::ZERO;
    }

    /// Assemble the complete asset
    pub fn assemble(&self) -> Result<Bytes, AssembleError> {
        let contiguous = self.contiguous_bytes();
        if self.state != TransferState::Ready {
            return Err(AssembleError::NotReady {
                contiguous,
                total: self.total_size,
            });
        }

        let store = self.chunks.as_ref().ok_or(AssembleError::NotReady {
            contiguous,
            total: self.total_size,
        })?;
        let mut buffer = vec![0u8; contiguous as usize];
        store.assemble_into(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    /// Contiguous prefix received so far
    pub fn partial(&self) -> Bytes {
        self.chunks
            .as_ref()
            .map(ChunkStore::assemble)
            .unwrap_or_default()
    }

    /// Asset being fetched
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Requested asset type
    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    /// Current reassembly state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Whether the asset can be assembled
    pub fn is_ready(&self) -> bool {
        self.state == TransferState::Ready
    }

    /// Whether the stall threshold was exceeded since the last accepted chunk
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Declared total size
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Sum of stored chunk sizes
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Gap-free prefix length
    pub fn contiguous_bytes(&self) -> u64 {
        self.chunks
            .as_ref()
            .map(ChunkStore::contiguous_bytes)
            .unwrap_or(0)
    }

    /// Time since the last accepted chunk (or the last retry)
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Whether any chunk has ever been handed to this transfer
    pub fn has_chunk_store(&self) -> bool {
        self.chunks.is_some()
    }

    /// Creation timestamp
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
