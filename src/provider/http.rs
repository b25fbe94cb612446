//! HTTP pull transport: `GET {base_url}/{asset_id}`

use async_trait::async_trait;
use url::Url;

use super::sink::TransferSink;
use super::traits::{AssetProvider, FetchRequest, serves_type};
use crate::config::HttpProviderConfig;
use crate::error::{Error, ProviderError, Result};
use crate::retry::fetch_with_retry;
use crate::types::{AssetId, AssetType, TransportKind};

/// Asset server reachable over plain HTTP
pub struct HttpProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpProvider {
    /// Provider name used in `provider_order`
    pub const NAME: &'static str = "http";

    /// Create a provider with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the base URL cannot carry path segments or the HTTP
    /// client cannot be created
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(Error::config(
                "http.base_url",
                format!("'{}' cannot be used as a base URL", config.base_url),
            ));
        }

        let mut builder = reqwest::Client::builder().user_agent("asset-transfer");
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// URL an asset is fetched from
    pub fn asset_url(&self, asset_id: AssetId) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("http.base_url", "base URL cannot carry path segments"))?
            .pop_if_empty()
            .push(&asset_id.to_string());
        Ok(url)
    }

    async fn get_once(&self, url: &Url, asset_id: AssetId) -> Result<bytes::Bytes> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                provider: Self::NAME,
                asset_id,
            }
            .into());
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: Self::NAME,
                asset_id,
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl AssetProvider for HttpProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Pull
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        serves_type(&self.config.asset_types, asset_type)
    }

    async fn fetch(&self, request: FetchRequest, sink: TransferSink) -> Result<()> {
        let url = self.asset_url(request.asset_id)?;
        tracing::debug!(
            asset_id = %request.asset_id,
            %url,
            attempt = request.attempt,
            "Fetching asset over HTTP"
        );

        let body = fetch_with_retry(&self.config.retry, || {
            self.get_once(&url, request.asset_id)
        })
        .await?;

        tracing::debug!(asset_id = %request.asset_id, size = body.len(), "HTTP asset fetched");
        sink.complete(body).await;
        Ok(())
    }
}
