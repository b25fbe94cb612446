//! XML-RPC pull transport
//!
//! Sends one `methodCall` per fetch carrying the asset UUID (string) and the
//! asset type code (int). A successful response holds the asset as a single
//! `<base64>` value; a `<fault>` response is a terminal rejection.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;

use super::sink::TransferSink;
use super::traits::{AssetProvider, FetchRequest, serves_type};
use crate::config::XmlRpcProviderConfig;
use crate::error::{Error, ProviderError, Result};
use crate::retry::fetch_with_retry;
use crate::types::{AssetId, AssetType, TransportKind};

/// Asset service reachable over XML-RPC
pub struct XmlRpcProvider {
    client: reqwest::Client,
    config: XmlRpcProviderConfig,
}

/// Decoded `methodResponse`
#[derive(Debug, PartialEq, Eq)]
enum MethodResponse {
    Payload(Vec<u8>),
    Fault { code: Option<i64>, message: String },
}

impl XmlRpcProvider {
    /// Provider name used in `provider_order`
    pub const NAME: &'static str = "xmlrpc";

    /// Create a provider with its own HTTP client
    pub fn new(config: XmlRpcProviderConfig) -> Result<Self> {
        if config.method_name.trim().is_empty() {
            return Err(Error::config(
                "xmlrpc.method_name",
                "method name must not be empty",
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

    async fn call_once(&self, body: &str, asset_id: AssetId) -> Result<Bytes> {
        let response = self
            .client
            .post(self.config.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: Self::NAME,
                asset_id,
                status: status.as_u16(),
            }
            .into());
        }

        let text = response.text().await?;
        match parse_response(&text)? {
            MethodResponse::Payload(data) => Ok(Bytes::from(data)),
            MethodResponse::Fault { code, message } => {
                tracing::debug!(%asset_id, fault_code = ?code, fault = %message, "XML-RPC fault");
                Err(ProviderError::Rejected {
                    provider: Self::NAME,
                    asset_id,
                    reason: message,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl AssetProvider for XmlRpcProvider {
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
        let body = method_call(
            &self.config.method_name,
            request.asset_id,
            request.asset_type,
        );
        tracing::debug!(
            asset_id = %request.asset_id,
            method = %self.config.method_name,
            attempt = request.attempt,
            "Calling XML-RPC asset method"
        );

        let payload = fetch_with_retry(&self.config.retry, || {
            self.call_once(&body, request.asset_id)
        })
        .await?;

        sink.complete(payload).await;
        Ok(())
    }
}

fn method_call(method: &str, asset_id: AssetId, asset_type: AssetType) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <methodCall>\
         <methodName>{}</methodName>\
         <params>\
         <param><value><string>{}</string></value></param>\
         <param><value><int>{}</int></value></param>\
         </params>\
         </methodCall>",
        quick_xml::escape::escape(method),
        asset_id,
        asset_type.code()
    )
}

fn parse_response(xml: &str) -> std::result::Result<MethodResponse, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut in_fault = false;
    let mut base64: Option<String> = None;
    let mut member_name: Option<String> = None;
    let mut fault_code: Option<i64> = None;
    let mut fault_string: Option<String> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ProviderError::Protocol(format!(
                "malformed XML-RPC response at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            XmlEvent::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match name.as_str() {
                    "methodResponse" => saw_root = true,
                    "fault" => in_fault = true,
                    "member" => member_name = None,
                    "base64" if !in_fault => {
                        base64.get_or_insert_with(String::new);
                    }
                    _ => {}
                }
                stack.push(name);
            }
            XmlEvent::Empty(empty) => {
                if empty.name().as_ref() == b"base64" && !in_fault {
                    base64.get_or_insert_with(String::new);
                }
            }
            XmlEvent::End(_) => {
                if stack.pop().as_deref() == Some("fault") {
                    in_fault = false;
                }
            }
            XmlEvent::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ProviderError::Protocol(format!("bad XML text: {}", e)))?;
                let current = stack.last().map(String::as_str);

                if in_fault {
                    match current {
                        Some("name") => member_name = Some(text.into_owned()),
                        Some("string") | Some("int") | Some("i4") | Some("value") => {
                            match member_name.as_deref() {
                                Some("faultString") => fault_string = Some(text.into_owned()),
                                Some("faultCode") => fault_code = text.trim().parse().ok(),
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                } else if current == Some("base64") {
                    if let Some(buffer) = base64.as_mut() {
                        buffer.push_str(&text);
                    }
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ProviderError::Protocol(
            "response is not an XML-RPC methodResponse".to_string(),
        ));
    }

    if fault_code.is_some() || fault_string.is_some() {
        return Ok(MethodResponse::Fault {
            code: fault_code,
            message: fault_string.unwrap_or_else(|| "unspecified fault".to_string()),
        });
    }

    let encoded = base64.ok_or_else(|| {
        ProviderError::Protocol("XML-RPC response carries no base64 value".to_string())
    })?;
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let data = STANDARD
        .decode(cleaned)
        .map_err(|e| ProviderError::Protocol(format!("invalid base64 payload: {}", e)))?;

    Ok(MethodResponse::Payload(data))
}
