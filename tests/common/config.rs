//! Configuration builders for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use asset_transfer::{Config, RetryConfig, TransferConfig, UdpProviderConfig};

/// Transfer policy that stalls quickly so tests stay fast
pub fn fast_transfer() -> TransferConfig {
    TransferConfig::new(Duration::from_millis(150), 2)
}

/// Manager config with a fast transfer policy and ticker
pub fn fast_config() -> Config {
    let mut config = Config::new(fast_transfer());
    config.tick_interval = Duration::from_millis(20);
    config
}

/// Retry policy without jitter and with millisecond delays
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// UDP transport bound to loopback, talking to `server`
pub fn loopback_udp(server: SocketAddr) -> UdpProviderConfig {
    let mut udp = UdpProviderConfig::new(server);
    udp.bind_address = SocketAddr::from(([127, 0, 0, 1], 0));
    udp
}
