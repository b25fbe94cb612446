//! Configuration types for asset-transfer
//!
//! The manager reads these values but never loads them itself; callers build
//! a [`Config`] in code or deserialize it from whatever source they use.
//! Durations are (de)serialized as whole milliseconds.

use crate::error::{Error, Result};
use crate::types::AssetType;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use url::Url;

/// Stall detection and retry budget
///
/// There is deliberately no `Default`: the stall timeout and retry budget are
/// product decisions and must be supplied by the embedding application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Idle time without an accepted chunk after which a transfer is stalled
    #[serde(with = "duration_serde")]
    pub stall_timeout: Duration,

    /// Number of times a stalled transfer is re-issued before it fails
    pub max_retries: u32,
}

impl TransferConfig {
    /// Create a transfer policy
    pub fn new(stall_timeout: Duration, max_retries: u32) -> Self {
        Self {
            stall_timeout,
            max_retries,
        }
    }
}

/// Main configuration for AssetManager
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Stall timeout and retry budget
    pub transfer: TransferConfig,

    /// Provider names in selection order (empty = registration order)
    ///
    /// For each request the first provider in this list that supports the
    /// requested asset type serves the transfer.
    #[serde(default)]
    pub provider_order: Vec<String>,

    /// Period of the background ticker started by `spawn_ticker` (default: 100ms)
    #[serde(default = "default_tick_interval", with = "duration_serde")]
    pub tick_interval: Duration,

    /// Capacity of the lifecycle event broadcast channel (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Connectionless UDP transport
    #[serde(default)]
    pub udp: Option<UdpProviderConfig>,

    /// HTTP pull transport
    #[serde(default)]
    pub http: Option<HttpProviderConfig>,

    /// XML-RPC pull transport
    #[serde(default)]
    pub xmlrpc: Option<XmlRpcProviderConfig>,
}

impl Config {
    /// Create a configuration with the given transfer policy and defaults elsewhere
    pub fn new(transfer: TransferConfig) -> Self {
        Self {
            transfer,
            provider_order: Vec::new(),
            tick_interval: default_tick_interval(),
            event_buffer: default_event_buffer(),
            udp: None,
            http: None,
            xmlrpc: None,
        }
    }

    /// Check the configuration for values the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.transfer.stall_timeout.is_zero() {
            return Err(Error::config(
                "stall_timeout",
                "stall timeout must be greater than zero",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config(
                "tick_interval",
                "tick interval must be greater than zero",
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer",
                "event buffer must hold at least one event",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.provider_order {
            if name.trim().is_empty() {
                return Err(Error::config(
                    "provider_order",
                    "provider names must not be empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::config(
                    "provider_order",
                    format!("provider '{name}' listed more than once"),
                ));
            }
        }

        if let Some(udp) = &self.udp {
            if udp.max_datagram_size < crate::provider::udp::MIN_DATAGRAM_SIZE {
                return Err(Error::config(
                    "udp.max_datagram_size",
                    format!(
                        "max datagram size must be at least {} bytes",
                        crate::provider::udp::MIN_DATAGRAM_SIZE
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Connectionless transport settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpProviderConfig {
    /// World server address that answers asset requests
    pub server: SocketAddr,

    /// Local bind address (default: 0.0.0.0:0)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Largest datagram accepted from the server (default: 1500)
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Asset types served by this transport (empty = all)
    #[serde(default)]
    pub asset_types: Vec<AssetType>,
}

impl UdpProviderConfig {
    /// Settings for a server address with defaults elsewhere
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            bind_address: default_bind_address(),
            max_datagram_size: default_max_datagram_size(),
            asset_types: Vec::new(),
        }
    }
}

/// HTTP pull transport settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Base URL; assets are fetched from `{base_url}/{asset_id}`
    pub base_url: Url,

    /// Per-request timeout (None = reqwest default)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Provider-internal retry for transient network errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Asset types served by this transport (empty = all)
    #[serde(default)]
    pub asset_types: Vec<AssetType>,
}

impl HttpProviderConfig {
    /// Settings for a base URL with defaults elsewhere
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: None,
            retry: RetryConfig::default(),
            asset_types: Vec::new(),
        }
    }
}

/// XML-RPC pull transport settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XmlRpcProviderConfig {
    /// XML-RPC endpoint URL
    pub endpoint: Url,

    /// Remote method name (default: "GetAsset")
    #[serde(default = "default_xmlrpc_method")]
    pub method_name: String,

    /// Per-request timeout (None = reqwest default)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Provider-internal retry for transient network errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Asset types served by this transport (empty = all)
    #[serde(default)]
    pub asset_types: Vec<AssetType>,
}

impl XmlRpcProviderConfig {
    /// Settings for an endpoint with defaults elsewhere
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            method_name: default_xmlrpc_method(),
            request_timeout: None,
            retry: RetryConfig::default(),
            asset_types: Vec::new(),
        }
    }
}

/// Retry configuration for transient transport failures
///
/// Used by the pull transports around a single request; it is invisible to
/// the manager, which only sees the final success or failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 250ms)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 5 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_event_buffer() -> usize {
    1024
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}

fn default_max_datagram_size() -> usize {
    1500
}

fn default_xmlrpc_method() -> String {
    "GetAsset".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
