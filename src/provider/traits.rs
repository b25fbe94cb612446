//! Provider capability contract

use async_trait::async_trait;

use super::sink::TransferSink;
use crate::types::{AssetId, AssetType, TransportKind};

/// One fetch issued to a provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Asset to fetch
    pub asset_id: AssetId,
    /// Requested asset type
    pub asset_type: AssetType,
    /// 0 for the initial fetch, n for the n-th stall retry
    pub attempt: u32,
}

/// Transport-specific adapter able to fetch assets
///
/// `fetch` runs in its own task; the manager never awaits it. Implementations
/// report results through the supplied [`TransferSink`]:
///
/// - **Push** transports call [`TransferSink::chunk`] once per received
///   fragment. `fetch` should return as soon as the request is on the wire;
///   fragments are delivered later from the provider's own receive loop.
/// - **Pull** transports call [`TransferSink::complete`] exactly once with the
///   whole asset, or return `Err` (which the manager turns into a request
///   failure). They must not call both.
///
/// A `fetch` that returns `Err` fails the transfer immediately; there is no
/// retry at the manager level for provider errors. Any provider-internal
/// retry is invisible to the manager.
///
/// # Examples
///
/// ```
/// use asset_transfer::provider::{AssetProvider, FetchRequest, TransferSink};
/// use asset_transfer::types::{AssetType, TransportKind};
/// use async_trait::async_trait;
/// use bytes::Bytes;
///
/// struct StaticProvider;
///
/// #[async_trait]
/// impl AssetProvider for StaticProvider {
///     fn name(&self) -> &'static str {
///         "static"
///     }
///
///     fn transport(&self) -> TransportKind {
///         TransportKind::Pull
///     }
///
///     async fn fetch(&self, _request: FetchRequest, sink: TransferSink) -> asset_transfer::Result<()> {
///         sink.complete(Bytes::from_static(b"asset body")).await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AssetProvider: Send + Sync {
    /// Identifier used in `provider_order` and in logs
    fn name(&self) -> &'static str;

    /// Whether this provider streams chunks or returns one buffer
    ///
    /// The manager drops chunks for transfers served by a
    /// [`TransportKind::Pull`] provider, so those never build a chunk store.
    fn transport(&self) -> TransportKind;

    /// Whether this provider can serve assets of `asset_type`
    fn supports(&self, _asset_type: AssetType) -> bool {
        true
    }

    /// Initiate a fetch of `request.asset_id`
    async fn fetch(&self, request: FetchRequest, sink: TransferSink) -> crate::Result<()>;
}

/// Shared `supports` rule for providers configured with an asset type list
pub(crate) fn serves_type(configured: &[AssetType], asset_type: AssetType) -> bool {
    configured.is_empty() || configured.contains(&asset_type)
}
