//! # asset-transfer
//!
//! Provider-agnostic asset transfer engine for virtual-world clients.
//!
//! Assets (meshes, textures, sounds) are identified by UUID and fetched from a
//! remote world server over one of several transports:
//! - a connectionless push transport that streams indexed fragments out of
//!   order, which are reassembled into one ordered buffer
//! - HTTP and XML-RPC pull transports that return the whole asset at once
//!
//! ## Design Philosophy
//!
//! - **One transfer per asset** - concurrent requests for the same asset share
//!   a single fetch and receive the same buffer
//! - **Never corrupt received data** - chunks are write-once; stalls retry
//!   without discarding what has arrived
//! - **Library-first** - no storage, no UI; consumers get a callback per request
//! - **Event-driven** - lifecycle events are broadcast to subscribers
//!
//! ## Quick Start
//!
//! ```no_run
//! use asset_transfer::{AssetManager, Config, TransferConfig, UdpProviderConfig};
//! use asset_transfer::types::{AssetType, AssetOutcome};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new(TransferConfig::new(Duration::from_secs(5), 3));
//!     config.udp = Some(UdpProviderConfig::new("203.0.113.7:12035".parse()?));
//!
//!     let manager = AssetManager::from_config(config).await?;
//!     manager.spawn_ticker();
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let asset_id = "6a9ee8b2-1f0e-4c4c-9d8e-3f62b0a0b7c1".parse()?;
//!     let (_handle, outcome) = manager.fetch(asset_id, AssetType::Sound).await?;
//!     match outcome.await? {
//!         AssetOutcome::Completed(bytes) => println!("received {} bytes", bytes.len()),
//!         AssetOutcome::Failed(reason) => eprintln!("fetch failed: {reason}"),
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Ordered, write-once chunk storage
pub mod chunk_store;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Asset manager (decomposed into focused submodules)
pub mod manager;
/// Asset providers and concrete transports
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-asset reassembly state machine
pub mod transfer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use chunk_store::ChunkStore;
pub use config::{
    Config, HttpProviderConfig, RetryConfig, TransferConfig, UdpProviderConfig,
    XmlRpcProviderConfig,
};
pub use error::{AssembleError, CodecError, Error, FailureReason, ProviderError, Result};
pub use manager::{AssetManager, DeliveryTarget};
pub use provider::{
    AssetProvider, FetchRequest, HttpProvider, SinkStatus, TransferSink, UdpProvider,
    XmlRpcProvider,
};
pub use transfer::{ChunkDisposition, Transfer, TransferState};
pub use types::{
    AssetId, AssetOutcome, AssetType, Event, RequestHandle, RequestId, RequestState,
    TransferProgress, TransportKind,
};

/// Helper function to run the manager until a termination signal arrives.
///
/// Waits for a termination signal and then calls the manager's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use asset_transfer::{AssetManager, Config, TransferConfig, run_with_shutdown};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::new(TransferConfig::new(Duration::from_secs(5), 3));
///     let manager = AssetManager::from_config(config).await?;
///     manager.spawn_ticker();
///
///     // Run with automatic signal handling
///     run_with_shutdown(manager).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: AssetManager) {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
