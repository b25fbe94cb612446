//! Retry logic with exponential backoff
//!
//! Pull transports wrap each remote request in [`fetch_with_retry`] so that
//! transient network failures (timeouts, refused connections, 5xx responses)
//! are retried inside the provider. The manager never sees these attempts: a
//! pull provider reports exactly one final success or failure per fetch.
//!
//! # Example
//!
//! ```no_run
//! use asset_transfer::retry::{IsRetryable, fetch_with_retry};
//! use asset_transfer::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! fetch_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ProviderError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (asset missing, request rejected, malformed response) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            // Server-side trouble or throttling
            ProviderError::Status { status, .. } => *status >= 500 || *status == 429,
            ProviderError::NotFound { .. } => false,
            ProviderError::Rejected { .. } => false,
            ProviderError::Protocol(_) => false,
            ProviderError::Unavailable(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Provider(e) => e.is_retryable(),
            Error::Config { .. } => false,
            Error::InvalidAssetId(_) => false,
            Error::NoProvider { .. } => false,
            Error::RequestNotFound(_) => false,
            Error::Codec(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn server_busy(asset_id: AssetId) -> Error {
        ProviderError::Status {
            provider: "http",
            asset_id,
            status: 503,
        }
        .into()
    }

    fn missing(asset_id: AssetId) -> Error {
        ProviderError::NotFound {
            provider: "http",
            asset_id,
        }
        .into()
    }

    /// Operation that fails with `errors` in order, then yields the asset body
    fn scripted(
        errors: Vec<Error>,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static [u8], Error>> {
        let mut errors = errors.into_iter();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(match errors.next() {
                Some(e) => Err(e),
                None => Ok(&b"asset"[..]),
            })
        }
    }

    #[tokio::test]
    async fn test_first_response_is_returned_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));

        let body = fetch_with_retry(&fast_config(3), scripted(vec![], calls.clone()))
            .await
            .unwrap();

        assert_eq!(body, b"asset");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_busy_is_retried_until_success() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![server_busy(asset_id), server_busy(asset_id)];

        let body = fetch_with_retry(&fast_config(3), scripted(errors, calls.clone()))
            .await
            .unwrap();

        assert_eq!(body, b"asset");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_busy_exhausts_budget_with_last_status() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = (0..5).map(|_| server_busy(asset_id)).collect();

        let err = fetch_with_retry(&fast_config(2), scripted(errors, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::Status { status: 503, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial attempt + 2 retries");
    }

    #[tokio::test]
    async fn test_missing_asset_is_not_retried() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![missing(asset_id), server_busy(asset_id)];

        let err = fetch_with_retry(&fast_config(5), scripted(errors, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::NotFound { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_after_busy_stops_retrying() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![server_busy(asset_id), missing(asset_id)];

        let err = fetch_with_retry(&fast_config(5), scripted(errors, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::NotFound { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_busy_retries_back_off_exponentially() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = (0..4).map(|_| server_busy(asset_id)).collect();
        let start = std::time::Instant::now();

        let result = fetch_with_retry(&fast_config(3), scripted(errors, calls)).await;

        // 10ms + 20ms + 40ms between the four attempts
        assert!(result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn test_backoff_is_capped_at_max_delay() {
        let asset_id = AssetId::new_v4();
        let calls = Arc::new(AtomicU32::new(0));
        let errors = (0..6).map(|_| server_busy(asset_id)).collect();
        let config = RetryConfig {
            max_delay: Duration::from_millis(15),
            ..fast_config(5)
        };
        let start = std::time::Instant::now();

        let result = fetch_with_retry(&config, scripted(errors, calls)).await;

        // 10ms + 4 × 15ms, against 310ms uncapped
        assert!(result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "waited {elapsed:?}");
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..20 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn test_provider_status_retryability() {
        let asset_id = AssetId::new_v4();
        let status = |status| ProviderError::Status {
            provider: "http",
            asset_id,
            status,
        };

        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(
            !ProviderError::NotFound {
                provider: "http",
                asset_id
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_is_retryable_io() {
        let timeout_err = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(timeout_err.is_retryable());

        let not_found = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_error_wraps_provider_retryability() {
        let err = Error::Provider(ProviderError::Protocol("bad xml".into()));
        assert!(!err.is_retryable());
        assert!(!Error::ShuttingDown.is_retryable());
    }
}
