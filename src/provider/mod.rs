//! Asset providers: transport-specific adapters behind one capability trait
//!
//! The manager only knows the [`AssetProvider`] trait. Three transports ship
//! with the crate:
//!
//! - [`UdpProvider`]: connectionless push transport; the server streams
//!   indexed fragments, out of order and possibly duplicated
//! - [`HttpProvider`]: pull transport returning the whole asset per GET
//! - [`XmlRpcProvider`]: pull transport returning the asset base64-encoded in
//!   an XML-RPC response
//!
//! Providers report back through a [`TransferSink`], a handle bound to one
//! asset and one transfer generation. Events from a sink whose transfer has
//! been retired are discarded.
//!
//! ## Usage
//!
//! ```no_run
//! use asset_transfer::config::{Config, HttpProviderConfig, TransferConfig};
//! use asset_transfer::provider::{AssetProvider, HttpProvider};
//! use asset_transfer::AssetManager;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> asset_transfer::Result<()> {
//! let http = HttpProvider::new(HttpProviderConfig::new(
//!     "http://assets.example.com/assets/".parse().expect("valid url"),
//! ))?;
//! let providers: Vec<Arc<dyn AssetProvider>> = vec![Arc::new(http)];
//!
//! let config = Config::new(TransferConfig::new(Duration::from_secs(10), 3));
//! let manager = AssetManager::new(config, providers)?;
//! # Ok(())
//! # }
//! ```

mod http;
mod sink;
mod traits;
pub mod udp;
mod xmlrpc;

pub use http::HttpProvider;
pub use sink::{SinkStatus, TransferSink};
pub use traits::{AssetProvider, FetchRequest};
pub use udp::UdpProvider;
pub use xmlrpc::XmlRpcProvider;
