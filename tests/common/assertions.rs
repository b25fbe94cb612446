//! Custom test assertions for integration tests

use std::time::Duration;

use asset_transfer::{AssetId, AssetManager, AssetOutcome, Event};
use tokio::sync::{broadcast, oneshot};

/// Wait for a request's outcome, panicking after `timeout`
pub async fn expect_outcome(
    rx: oneshot::Receiver<AssetOutcome>,
    timeout: Duration,
) -> AssetOutcome {
    tokio::time::timeout(timeout, rx)
        .await
        .expect("timed out waiting for asset outcome")
        .expect("request was cancelled")
}

/// Collect events until one matches `done` or `timeout` elapses
///
/// Returns every event received, including the matching one.
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut done: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let finished = done(&event);
            collected.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    collected
}

/// Poll until the transfer for `asset_id` has received `bytes` bytes
pub async fn wait_for_bytes(manager: &AssetManager, asset_id: AssetId, bytes: u64) -> bool {
    for _ in 0..100 {
        if manager
            .progress(asset_id)
            .await
            .is_some_and(|p| p.bytes_received >= bytes)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
