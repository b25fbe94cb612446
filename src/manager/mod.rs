//! Asset manager split into focused submodules.
//!
//! The `AssetManager` struct and its methods are organized by concern:
//! - [`request`] - request intake, deduplication and cancellation
//! - [`inbound`] - chunk and pull events reported by providers
//! - [`tick`] - stall detection and retry escalation
//! - [`lifecycle`] - background ticker and shutdown
//! - [`delivery`] - fan-out of final outcomes to delivery targets

mod delivery;
mod inbound;
mod lifecycle;
mod request;
mod tick;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use delivery::DeliveryTarget;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use bytes::Bytes;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::{AssetProvider, HttpProvider, UdpProvider, XmlRpcProvider};
use crate::transfer::Transfer;
use crate::types::{AssetId, AssetType, Event, RequestId, RequestState, TransferProgress};

/// A caller waiting on a transfer
pub(crate) struct Waiter {
    pub(crate) request: RequestId,
    pub(crate) target: Box<dyn DeliveryTarget>,
    pub(crate) state: watch::Sender<RequestState>,
}

/// A transfer plus the bookkeeping the manager keeps for it
pub(crate) struct ActiveTransfer {
    pub(crate) transfer: Transfer,
    /// Distinguishes this transfer from earlier ones for the same asset
    pub(crate) generation: u64,
    pub(crate) provider: Arc<dyn AssetProvider>,
    /// Stall retries issued so far
    pub(crate) retries: u32,
    /// Whether the provider fetch has been initiated
    pub(crate) issued: bool,
    /// Delivery targets in attach order
    pub(crate) waiters: Vec<Waiter>,
}

impl ActiveTransfer {
    pub(crate) fn progress(&self) -> TransferProgress {
        TransferProgress {
            asset_id: self.transfer.asset_id(),
            provider: self.provider.name().to_string(),
            transport: self.provider.transport(),
            state: self.transfer.state(),
            stalled: self.transfer.is_stalled(),
            retries: self.retries,
            total_size: self.transfer.total_size(),
            bytes_received: self.transfer.bytes_received(),
            contiguous_bytes: self.transfer.contiguous_bytes(),
            waiters: self.waiters.len(),
            started_at: self.transfer.started_at(),
        }
    }
}

/// The transfer table: the only shared mutable state of the manager
#[derive(Default)]
pub(crate) struct TransferTable {
    pub(crate) transfers: HashMap<AssetId, ActiveTransfer>,
    /// Live request → asset index, for cancellation
    pub(crate) requests: HashMap<RequestId, AssetId>,
    pub(crate) next_generation: u64,
}

impl TransferTable {
    /// Look up a transfer, optionally requiring a specific generation
    pub(crate) fn current_mut(
        &mut self,
        asset_id: AssetId,
        generation: Option<u64>,
    ) -> Option<&mut ActiveTransfer> {
        self.transfers
            .get_mut(&asset_id)
            .filter(|active| generation.is_none_or(|g| active.generation == g))
    }

    /// Remove a transfer and forget its requests
    pub(crate) fn retire(&mut self, asset_id: AssetId) -> Option<ActiveTransfer> {
        let active = self.transfers.remove(&asset_id)?;
        for waiter in &active.waiters {
            self.requests.remove(&waiter.request);
        }
        Some(active)
    }
}

/// State shared by every clone of an [`AssetManager`]
pub(crate) struct ManagerShared {
    pub(crate) config: Config,
    /// Providers in selection order
    pub(crate) providers: Vec<Arc<dyn AssetProvider>>,
    pub(crate) table: Mutex<TransferTable>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) next_request_id: AtomicU64,
    /// Set to false during shutdown
    pub(crate) accepting_new: AtomicBool,
    /// Stops the background ticker
    pub(crate) shutdown_token: CancellationToken,
}

/// Provider-agnostic asset fetcher (cloneable - all state is behind one Arc)
///
/// Keeps at most one transfer per asset ID. Concurrent requests for the same
/// asset attach to the running transfer and receive the same result, in the
/// order they attached.
#[derive(Clone)]
pub struct AssetManager {
    pub(crate) shared: Arc<ManagerShared>,
}

impl AssetManager {
    /// Create a manager over an explicit provider set
    ///
    /// Providers are ordered by `config.provider_order`; an empty order keeps
    /// registration order. Registered providers missing from a non-empty order
    /// are not used.
    ///
    /// # Errors
    /// Returns a configuration error if the config is invalid, a provider name
    /// is registered twice, `provider_order` names an unregistered provider,
    /// or no provider remains.
    pub fn new(config: Config, providers: Vec<Arc<dyn AssetProvider>>) -> Result<Self> {
        config.validate()?;
        let providers = order_providers(&config.provider_order, providers)?;
        if providers.is_empty() {
            return Err(Error::config(
                "provider_order",
                "at least one asset provider is required",
            ));
        }

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        tracing::info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            stall_timeout_ms = config.transfer.stall_timeout.as_millis() as u64,
            max_retries = config.transfer.max_retries,
            "Asset manager initialized"
        );

        Ok(Self {
            shared: Arc::new(ManagerShared {
                config,
                providers,
                table: Mutex::new(TransferTable::default()),
                event_tx,
                next_request_id: AtomicU64::new(1),
                accepting_new: AtomicBool::new(true),
                shutdown_token: CancellationToken::new(),
            }),
        })
    }

    /// Create a manager with the transports configured in `config`
    ///
    /// Binds the UDP socket (if configured) and builds the HTTP and XML-RPC
    /// clients. Provider names are `udp`, `http` and `xmlrpc`.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let mut providers: Vec<Arc<dyn AssetProvider>> = Vec::new();
        if let Some(udp) = &config.udp {
            providers.push(Arc::new(UdpProvider::bind(udp).await?));
        }
        if let Some(http) = &config.http {
            providers.push(Arc::new(HttpProvider::new(http.clone())?));
        }
        if let Some(xmlrpc) = &config.xmlrpc {
            providers.push(Arc::new(XmlRpcProvider::new(xmlrpc.clone())?));
        }

        Self::new(config, providers)
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    /// Subscribe to lifecycle events
    ///
    /// Slow subscribers miss events once `event_buffer` is exceeded.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.shared.event_tx.send(event).ok();
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Provider names in selection order
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.shared.providers.iter().map(|p| p.name()).collect()
    }

    /// First provider in selection order that serves `asset_type`
    pub(crate) fn select_provider(&self, asset_type: AssetType) -> Option<Arc<dyn AssetProvider>> {
        self.shared
            .providers
            .iter()
            .find(|p| p.supports(asset_type))
            .cloned()
    }

    /// Progress of the in-flight transfer for `asset_id`
    pub async fn progress(&self, asset_id: AssetId) -> Option<TransferProgress> {
        let table = self.shared.table.lock().await;
        table.transfers.get(&asset_id).map(ActiveTransfer::progress)
    }

    /// Contiguous prefix received so far for `asset_id`
    ///
    /// Usable for progressive decoding. Empty for pull transfers and for
    /// push transfers still missing chunk 0.
    pub async fn partial_asset(&self, asset_id: AssetId) -> Option<Bytes> {
        let table = self.shared.table.lock().await;
        table
            .transfers
            .get(&asset_id)
            .map(|active| active.transfer.partial())
    }

    /// Snapshot of every in-flight transfer
    pub async fn active_transfers(&self) -> Vec<TransferProgress> {
        let table = self.shared.table.lock().await;
        table.transfers.values().map(ActiveTransfer::progress).collect()
    }

    /// Whether new requests are accepted
    pub fn is_accepting(&self) -> bool {
        self.shared
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

fn order_providers(
    order: &[String],
    providers: Vec<Arc<dyn AssetProvider>>,
) -> Result<Vec<Arc<dyn AssetProvider>>> {
    let mut by_name: HashMap<&'static str, Arc<dyn AssetProvider>> = HashMap::new();
    for provider in &providers {
        if by_name.insert(provider.name(), provider.clone()).is_some() {
            return Err(Error::config(
                "provider_order",
                format!("provider '{}' registered more than once", provider.name()),
            ));
        }
    }

    if order.is_empty() {
        return Ok(providers);
    }

    let mut ordered = Vec::with_capacity(order.len());
    for name in order {
        let provider = by_name.remove(name.as_str()).ok_or_else(|| {
            Error::config(
                "provider_order",
                format!("provider '{name}' is not registered"),
            )
        })?;
        ordered.push(provider);
    }

    for unused in by_name.keys() {
        tracing::warn!(provider = unused, "Provider not listed in provider_order, ignoring");
    }

    Ok(ordered)
}
