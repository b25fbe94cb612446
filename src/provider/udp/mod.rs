//! Connectionless push transport
//!
//! One request datagram per fetch; the server answers with indexed fragments
//! that may arrive out of order, duplicated, or not at all. A background
//! receive loop decodes datagrams and routes each fragment to the
//! [`TransferSink`] registered for its asset. Lost fragments are recovered
//! by the manager's stall retry, which calls [`AssetProvider::fetch`] again.

mod packet;

pub use packet::{
    Datagram, FLAG_HAS_SIZE, FRAGMENT_HEADER_LEN, Fragment, KIND_FRAGMENT, KIND_NOT_FOUND,
    KIND_REQUEST, MIN_DATAGRAM_SIZE, REQUEST_LEN, fragment_asset,
};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::sink::{SinkStatus, TransferSink};
use super::traits::{AssetProvider, FetchRequest, serves_type};
use crate::config::UdpProviderConfig;
use crate::error::{CodecError, Error, Result};
use crate::types::{AssetId, AssetType, TransportKind};

type Routes = Arc<Mutex<HashMap<AssetId, TransferSink>>>;

/// UDP asset transport
///
/// The receive loop stops when [`UdpProvider::shutdown`] is called or the
/// provider is dropped.
pub struct UdpProvider {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    asset_types: Vec<AssetType>,
    routes: Routes,
    cancel: CancellationToken,
}

impl UdpProvider {
    /// Provider name used in `provider_order`
    pub const NAME: &'static str = "udp";

    /// Bind the local socket and start the receive loop
    pub async fn bind(config: &UdpProviderConfig) -> Result<Self> {
        if config.max_datagram_size < MIN_DATAGRAM_SIZE {
            return Err(Error::config(
                "udp.max_datagram_size",
                format!("max datagram size must be at least {MIN_DATAGRAM_SIZE} bytes"),
            ));
        }

        let socket = Arc::new(UdpSocket::bind(config.bind_address).await?);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tracing::info!(
            local_addr = ?socket.local_addr().ok(),
            server = %config.server,
            "UDP asset transport bound"
        );

        tokio::spawn(receive_loop(
            socket.clone(),
            config.server,
            routes.clone(),
            config.max_datagram_size,
            cancel.clone(),
        ));

        Ok(Self {
            socket,
            server: config.server,
            asset_types: config.asset_types.clone(),
            routes,
            cancel,
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of assets with a registered route
    pub async fn active_routes(&self) -> usize {
        self.routes.lock().await.len()
    }

    /// Stop the receive loop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Drop routes whose transfer has been retired
    async fn prune_routes(&self) {
        let sinks: Vec<TransferSink> = self.routes.lock().await.values().cloned().collect();
        let mut closed = Vec::new();
        for sink in sinks {
            if !sink.is_open().await {
                closed.push(sink);
            }
        }
        if closed.is_empty() {
            return;
        }

        let mut routes = self.routes.lock().await;
        for sink in closed {
            remove_route(&mut routes, &sink);
        }
    }
}

impl Drop for UdpProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl AssetProvider for UdpProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Push
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        serves_type(&self.asset_types, asset_type)
    }

    async fn fetch(&self, request: FetchRequest, sink: TransferSink) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(crate::error::ProviderError::Unavailable(
                "UDP receive loop stopped".to_string(),
            )
            .into());
        }

        self.prune_routes().await;
        self.routes.lock().await.insert(request.asset_id, sink);

        let datagram = Datagram::Request {
            asset_id: request.asset_id,
            asset_type: request.asset_type,
        };
        self.socket.send_to(&datagram.encode(), self.server).await?;

        tracing::debug!(
            asset_id = %request.asset_id,
            asset_type = %request.asset_type,
            attempt = request.attempt,
            server = %self.server,
            "Sent asset request datagram"
        );
        Ok(())
    }
}

fn remove_route(routes: &mut HashMap<AssetId, TransferSink>, sink: &TransferSink) {
    // a newer transfer for the same asset may have replaced the route
    if routes
        .get(&sink.asset_id())
        .is_some_and(|current| current.generation() == sink.generation())
    {
        routes.remove(&sink.asset_id());
    }
}

/// Log only every Nth consecutive receive error after the first
const RECV_ERROR_LOG_EVERY: u32 = 100;

/// Pause after a failed receive, growing with consecutive failures up to 1s
fn recv_error_backoff(consecutive_errors: u32) -> Duration {
    let shift = consecutive_errors.saturating_sub(1).min(10);
    Duration::from_millis(1u64 << shift).min(Duration::from_secs(1))
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    routes: Routes,
    max_datagram_size: usize,
    cancel: CancellationToken,
) {
    // one spare byte so an oversized datagram shows up as len > max instead of
    // being silently truncated to fit
    let mut buf = vec![0u8; max_datagram_size + 1];
    let mut consecutive_errors: u32 = 0;

    loop {
        let (len, from) = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("UDP receive loop stopped");
                break;
            }
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => {
                    consecutive_errors = 0;
                    received
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    if consecutive_errors == 1 || consecutive_errors % RECV_ERROR_LOG_EVERY == 0 {
                        tracing::warn!(error = %e, consecutive_errors, "UDP receive failed");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!("UDP receive loop stopped");
                            break;
                        }
                        _ = tokio::time::sleep(recv_error_backoff(consecutive_errors)) => {}
                    }
                    continue;
                }
            }
        };

        if len > max_datagram_size {
            tracing::warn!(
                %from,
                len,
                max_datagram_size,
                "Dropping datagram larger than max_datagram_size"
            );
            continue;
        }

        if from != server {
            tracing::warn!(%from, "Dropping datagram from unexpected sender");
            continue;
        }

        let datagram = match Datagram::decode(Bytes::copy_from_slice(&buf[..len])) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::warn!(error = %e, len, "Dropping undecodable datagram");
                continue;
            }
        };

        dispatch(&routes, datagram).await;
    }
}

async fn dispatch(routes: &Routes, datagram: Datagram) {
    let asset_id = datagram.asset_id();
    let Some(sink) = routes.lock().await.get(&asset_id).cloned() else {
        tracing::debug!(%asset_id, kind = datagram.kind(), "No route for datagram, dropping");
        return;
    };

    match datagram {
        Datagram::Fragment(fragment) => {
            let status = sink
                .chunk(fragment.index, fragment.payload, fragment.total_size)
                .await;
            if status == SinkStatus::Closed {
                remove_route(&mut *routes.lock().await, &sink);
            }
        }
        Datagram::NotFound { .. } => {
            remove_route(&mut *routes.lock().await, &sink);
            sink.fail(format!("asset {asset_id} not found on server")).await;
        }
        Datagram::Request { .. } => {
            tracing::warn!(
                %asset_id,
                error = %CodecError::UnexpectedKind(KIND_REQUEST),
                "Server sent a request datagram, dropping"
            );
        }
    }
}
