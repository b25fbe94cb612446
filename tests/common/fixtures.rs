//! Fake world server and asset content generators

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asset_transfer::AssetId;
use asset_transfer::provider::udp::{Datagram, fragment_asset};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Deterministic asset body of `len` bytes
pub fn asset_bytes(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// How the fake server streams an asset's fragments
#[derive(Clone, Copy, Debug)]
pub enum ServeMode {
    /// Index order, once
    InOrder,
    /// Reverse index order, so the size-bearing fragment arrives last
    Reversed,
    /// Every fragment sent twice, interleaved
    Duplicated,
    /// The first request loses its last fragment; later requests are complete
    LoseTailOnFirstRequest,
    /// Never answer
    Silent,
}

/// UDP asset server on loopback
///
/// Answers `Request` datagrams with the asset's fragments, or `NotFound`
/// for assets it does not have.
pub struct FakeAssetServer {
    pub addr: SocketAddr,
    socket: Arc<UdpSocket>,
    requests: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeAssetServer {
    pub async fn start(
        assets: HashMap<AssetId, Bytes>,
        chunk_size: usize,
        mode: ServeMode,
    ) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(serve(
            socket.clone(),
            assets,
            chunk_size,
            mode,
            requests.clone(),
        ));

        Self {
            addr,
            socket,
            requests,
            handle,
        }
    }

    /// Number of request datagrams received so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Send a raw datagram from the server's own address
    pub async fn send_raw(&self, datagram: &Datagram, to: SocketAddr) {
        self.socket.send_to(&datagram.encode(), to).await.unwrap();
    }
}

impl Drop for FakeAssetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    assets: HashMap<AssetId, Bytes>,
    chunk_size: usize,
    mode: ServeMode,
    requests: Arc<AtomicUsize>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        let Ok((len, from)) = socket.recv_from(&mut buf).await else {
            break;
        };
        let Ok(Datagram::Request { asset_id, .. }) =
            Datagram::decode(Bytes::copy_from_slice(&buf[..len]))
        else {
            continue;
        };
        let attempt = requests.fetch_add(1, Ordering::SeqCst);

        if matches!(mode, ServeMode::Silent) {
            continue;
        }

        let Some(data) = assets.get(&asset_id) else {
            let not_found = Datagram::NotFound { asset_id }.encode();
            socket.send_to(&not_found, from).await.ok();
            continue;
        };

        let mut fragments = fragment_asset(asset_id, data, chunk_size);
        match mode {
            ServeMode::InOrder | ServeMode::Silent => {}
            ServeMode::Reversed => fragments.reverse(),
            ServeMode::Duplicated => {
                fragments = fragments
                    .into_iter()
                    .flat_map(|fragment| [fragment.clone(), fragment])
                    .collect();
            }
            ServeMode::LoseTailOnFirstRequest => {
                if attempt == 0 {
                    fragments.pop();
                }
            }
        }

        for fragment in fragments {
            socket.send_to(&fragment.encode(), from).await.ok();
        }
    }
}
