//! Shared test helpers for creating AssetManager instances in tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{Config, TransferConfig};
use crate::error::ProviderError;
use crate::manager::AssetManager;
use crate::provider::{AssetProvider, FetchRequest, TransferSink};
use crate::types::{AssetId, AssetOutcome, AssetType, RequestId, TransportKind};

pub(crate) const STALL_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const MAX_RETRIES: u32 = 2;

/// What a [`MockProvider`] does when asked to fetch
#[derive(Clone, Debug)]
pub(crate) enum Behaviour {
    /// Record the call and return; chunks are injected by the test
    Silent,
    /// Complete immediately with the given buffer
    PullOk(Bytes),
    /// Report a terminal failure through the sink
    PullFail(String),
    /// Fail fetch initiation itself
    InitError,
}

/// Provider that records every fetch and the sink it was given
pub(crate) struct MockProvider {
    name: &'static str,
    transport: TransportKind,
    types: Vec<AssetType>,
    behaviour: Behaviour,
    pub(crate) calls: Mutex<Vec<(FetchRequest, TransferSink)>>,
}

impl MockProvider {
    pub(crate) fn push(name: &'static str) -> Arc<Self> {
        Arc::new(Self::new(name, TransportKind::Push, Behaviour::Silent))
    }

    pub(crate) fn pull(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self::new(name, TransportKind::Pull, behaviour))
    }

    pub(crate) fn new(name: &'static str, transport: TransportKind, behaviour: Behaviour) -> Self {
        Self {
            name,
            transport,
            types: Vec::new(),
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn serving(mut self, types: &[AssetType]) -> Arc<Self> {
        self.types = types.to_vec();
        Arc::new(self)
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub(crate) fn sink(&self, call: usize) -> TransferSink {
        self.calls.lock().unwrap()[call].1.clone()
    }

    /// Yield until at least `count` fetches were recorded
    pub(crate) async fn wait_for_calls(&self, count: usize) {
        for _ in 0..200 {
            if self.call_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} fetch calls on {}, saw {}",
            self.name,
            self.call_count()
        );
    }
}

#[async_trait]
impl AssetProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        self.types.is_empty() || self.types.contains(&asset_type)
    }

    async fn fetch(&self, request: FetchRequest, sink: TransferSink) -> crate::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((request.clone(), sink.clone()));

        match &self.behaviour {
            Behaviour::Silent => Ok(()),
            Behaviour::PullOk(data) => {
                sink.complete(data.clone()).await;
                Ok(())
            }
            Behaviour::PullFail(message) => {
                sink.fail(message.clone()).await;
                Ok(())
            }
            Behaviour::InitError => Err(ProviderError::Unavailable(format!(
                "{} is offline",
                self.name
            ))
            .into()),
        }
    }
}

pub(crate) fn test_config() -> Config {
    Config::new(TransferConfig::new(STALL_TIMEOUT, MAX_RETRIES))
}

/// Manager over a single provider
pub(crate) fn create_test_manager(provider: Arc<MockProvider>) -> AssetManager {
    AssetManager::new(test_config(), vec![provider as Arc<dyn AssetProvider>]).unwrap()
}

/// Delivery target that records every callback
pub(crate) type DeliveryLog = Arc<Mutex<Vec<(RequestId, AssetOutcome)>>>;

pub(crate) fn delivery_log() -> DeliveryLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn recorder(log: &DeliveryLog) -> impl FnOnce(RequestId, AssetOutcome) + Send + 'static {
    let log = log.clone();
    move |request, outcome| log.lock().unwrap().push((request, outcome))
}

/// Feed `data` to the manager as `chunk_size` fragments in the given index order
pub(crate) async fn feed_chunks(
    manager: &AssetManager,
    asset_id: AssetId,
    data: &[u8],
    chunk_size: usize,
    order: &[usize],
) {
    let total = data.len() as u64;
    for &index in order {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(data.len());
        manager
            .on_chunk_received(
                asset_id,
                index as u32,
                Bytes::copy_from_slice(&data[start..end]),
                (index == 0).then_some(total),
            )
            .await;
    }
}
