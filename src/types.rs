//! Core types for asset-transfer

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, FailureReason};
use crate::transfer::TransferState;

/// Opaque identifier of a remote asset
///
/// Assets are addressed by UUID on every transport. The nil UUID is reserved
/// by world servers to mean "no asset" and is never a valid request target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub Uuid);

impl AssetId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a random asset ID
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }

    /// Raw 16-byte form used on the wire
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild from the raw 16-byte wire form
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Whether this is the reserved nil identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for AssetId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AssetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s.trim()).map_err(|e| Error::InvalidAssetId(format!("{s}: {e}")))?;
        if id.is_nil() {
            return Err(Error::InvalidAssetId(format!("{s}: nil asset id")));
        }
        Ok(Self(id))
    }
}

/// Kind of asset, used as the provider selection hint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Image data (J2K textures)
    Texture,
    /// Audio clip
    Sound,
    /// Script source
    Script,
    /// Skeletal animation
    Animation,
    /// Mesh geometry
    Mesh,
    /// Any other asset type, by wire code
    Other(u8),
}

impl AssetType {
    /// Convert a wire code to an AssetType
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AssetType::Texture,
            1 => AssetType::Sound,
            10 => AssetType::Script,
            20 => AssetType::Animation,
            43 => AssetType::Mesh,
            other => AssetType::Other(other),
        }
    }

    /// Convert to the wire code
    pub fn code(&self) -> u8 {
        match self {
            AssetType::Texture => 0,
            AssetType::Sound => 1,
            AssetType::Script => 10,
            AssetType::Animation => 20,
            AssetType::Mesh => 43,
            AssetType::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Texture => write!(f, "texture"),
            AssetType::Sound => write!(f, "sound"),
            AssetType::Script => write!(f, "script"),
            AssetType::Animation => write!(f, "animation"),
            AssetType::Mesh => write!(f, "mesh"),
            AssetType::Other(code) => write!(f, "other({code})"),
        }
    }
}

impl std::str::FromStr for AssetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "texture" => Ok(AssetType::Texture),
            "sound" => Ok(AssetType::Sound),
            "script" => Ok(AssetType::Script),
            "animation" => Ok(AssetType::Animation),
            "mesh" => Ok(AssetType::Mesh),
            other => other
                .parse::<u8>()
                .map(AssetType::from_code)
                .map_err(|_| Error::Other(format!("unknown asset type: {s}"))),
        }
    }
}

/// Identifier of a single caller request (one delivery target)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a caller request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted, provider fetch not yet issued
    Pending,
    /// Attached to an in-flight transfer
    InFlight,
    /// Asset delivered
    Completed,
    /// Failure delivered
    Failed,
    /// Detached by the caller; nothing was or will be delivered
    Cancelled,
}

impl RequestState {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }
}

/// Caller-visible handle returned by
/// [`AssetManager::request_asset`](crate::AssetManager::request_asset)
#[derive(Clone, Debug)]
pub struct RequestHandle {
    pub(crate) id: RequestId,
    pub(crate) asset_id: AssetId,
    pub(crate) state: tokio::sync::watch::Receiver<RequestState>,
}

impl RequestHandle {
    /// Request identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Asset this request is for
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Current state of the request
    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    /// Wait until the request reaches a terminal state
    ///
    /// Returns the last observed state if the manager is dropped first.
    pub async fn finished(&mut self) -> RequestState {
        loop {
            let current = *self.state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

/// Whether a provider streams chunks or returns one complete buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connectionless, chunked, out-of-order delivery
    Push,
    /// Request/response returning the whole asset at once
    Pull,
}

/// Final result handed to a delivery target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetOutcome {
    /// The fully assembled asset
    Completed(Bytes),
    /// The request failed
    Failed(FailureReason),
}

impl AssetOutcome {
    /// Returns the asset bytes if the request completed
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            AssetOutcome::Completed(bytes) => Some(bytes),
            AssetOutcome::Failed(_) => None,
        }
    }
}

/// Snapshot of an in-flight transfer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Asset being fetched
    pub asset_id: AssetId,
    /// Provider serving the transfer
    pub provider: String,
    /// Whether the provider streams chunks or returns one buffer
    pub transport: TransportKind,
    /// Reassembly state
    pub state: TransferState,
    /// Whether the transfer is currently considered stalled
    pub stalled: bool,
    /// Stall retries issued so far
    pub retries: u32,
    /// Declared total size (None until the header chunk arrives)
    pub total_size: Option<u64>,
    /// Sum of all stored chunk sizes
    pub bytes_received: u64,
    /// Length of the gap-free prefix starting at chunk 0
    pub contiguous_bytes: u64,
    /// Number of requests waiting on this transfer
    pub waiters: usize,
    /// When the transfer was created
    pub started_at: DateTime<Utc>,
}

/// Event emitted during the transfer lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new transfer was created and handed to a provider
    TransferStarted {
        /// Asset ID
        asset_id: AssetId,
        /// Provider name
        provider: String,
        /// First request attached to the transfer
        request: RequestId,
    },

    /// A request was attached to an already in-flight transfer
    RequestAttached {
        /// Asset ID
        asset_id: AssetId,
        /// The attached request
        request: RequestId,
    },

    /// A chunk was accepted
    Progress {
        /// Asset ID
        asset_id: AssetId,
        /// Bytes received so far (not necessarily contiguous)
        bytes_received: u64,
        /// Gap-free prefix length
        contiguous_bytes: u64,
        /// Declared total size, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_size: Option<u64>,
    },

    /// A transfer exceeded the stall timeout and was re-issued
    Stalled {
        /// Asset ID
        asset_id: AssetId,
        /// Retry number (1-based)
        retry: u32,
        /// Configured retry budget
        max_retries: u32,
    },

    /// Asset assembled and delivered
    Completed {
        /// Asset ID
        asset_id: AssetId,
        /// Asset size in bytes
        size: u64,
        /// Number of requests that received the asset
        delivered: usize,
    },

    /// Transfer failed and all waiting requests were notified
    Failed {
        /// Asset ID
        asset_id: AssetId,
        /// Failure reason
        reason: FailureReason,
        /// Number of requests that received the failure
        delivered: usize,
    },

    /// Last request detached; transfer abandoned
    Cancelled {
        /// Asset ID
        asset_id: AssetId,
    },

    /// Manager shut down
    Shutdown,
}
