//! Error types for asset-transfer
//!
//! This module provides the error taxonomy of the transfer engine:
//! - [`Error`] - crate-wide error returned from fallible API calls
//! - [`ProviderError`] - transport-level failures reported by providers
//! - [`CodecError`] - malformed datagrams on the connectionless transport
//! - [`AssembleError`] - reassembly requested before a transfer is complete
//! - [`FailureReason`] - the caller-visible reason delivered to a request's target
//!
//! Protocol anomalies (duplicate chunk, empty chunk, fragment for a retired
//! asset) are deliberately *not* errors: they are logged and dropped where they
//! occur and never surface here.

use crate::types::{AssetId, AssetType, RequestId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for asset-transfer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for asset-transfer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "stall_timeout")
        key: Option<String>,
    },

    /// Asset identifier could not be parsed or is not acceptable to any provider
    #[error("invalid asset id: {0}")]
    InvalidAssetId(String),

    /// No registered provider can serve the requested asset type
    #[error("no provider available for asset {asset_id} of type {asset_type}")]
    NoProvider {
        /// The asset that was requested
        asset_id: AssetId,
        /// The requested asset type
        asset_type: AssetType,
    },

    /// Request handle is unknown (already delivered, cancelled or never issued)
    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    /// Transport reported a failure
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Wire decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Shutdown in progress - not accepting new requests
    #[error("shutdown in progress: not accepting new asset requests")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Transport failures reported by an asset provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote endpoint does not have the asset
    #[error("asset {asset_id} not found on {provider}")]
    NotFound {
        /// Provider name
        provider: &'static str,
        /// The asset that was requested
        asset_id: AssetId,
    },

    /// The remote endpoint answered with an unexpected HTTP status
    #[error("{provider} returned HTTP {status} for asset {asset_id}")]
    Status {
        /// Provider name
        provider: &'static str,
        /// The asset that was requested
        asset_id: AssetId,
        /// The HTTP status code
        status: u16,
    },

    /// The remote endpoint refused the request (e.g. an XML-RPC fault)
    #[error("{provider} rejected asset {asset_id}: {reason}")]
    Rejected {
        /// Provider name
        provider: &'static str,
        /// The asset that was requested
        asset_id: AssetId,
        /// Reason given by the remote side
        reason: String,
    },

    /// The response could not be interpreted
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The provider is not in a state to issue requests (e.g. socket closed)
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors decoding datagrams of the connectionless transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Datagram shorter than the fixed header it claims
    #[error("datagram truncated: need {needed} bytes, have {actual}")]
    Truncated {
        /// Minimum number of bytes required
        needed: usize,
        /// Number of bytes actually present
        actual: usize,
    },

    /// Unknown message kind byte
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),

    /// Message kind is only valid in the other direction
    #[error("unexpected message kind 0x{0:02x}")]
    UnexpectedKind(u8),
}

/// Errors assembling a transfer's chunks into one buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// Target buffer does not match the contiguous prefix length
    #[error("target buffer holds {actual} bytes but contiguous prefix is {expected}")]
    LengthMismatch {
        /// Contiguous prefix length
        expected: u64,
        /// Target buffer length
        actual: u64,
    },

    /// The transfer has not received the full declared size yet
    #[error("transfer not ready: {contiguous} of {total:?} bytes contiguous")]
    NotReady {
        /// Contiguous prefix length
        contiguous: u64,
        /// Declared total size, if known
        total: Option<u64>,
    },
}

/// Why a request failed, as observed by its delivery target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No progress within the stall timeout after exhausting the retry budget
    Stalled {
        /// Number of retries that were issued before giving up
        retries: u32,
    },
    /// The provider reported a terminal failure
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
    /// The manager was shut down while the request was in flight
    Shutdown,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Stalled { retries } => {
                write!(f, "transfer stalled after {retries} retries")
            }
            FailureReason::Provider { provider, message } => write!(f, "{provider}: {message}"),
            FailureReason::Shutdown => write!(f, "asset manager shut down"),
        }
    }
}
