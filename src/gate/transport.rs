//! Transport collaborator contract.
//!
//! The gate performs at most one `send` per `secure_request` call. Retry
//! and timeout policy belong to the transport implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

/// A fully sanitized request ready to leave the process.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub operation: String,
    pub request_id: String,
    pub payload: BTreeMap<String, String>,
    pub headers: HeaderMap,
}

/// What the server answered.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error("invalid endpoint for {operation}: {source}")]
    Endpoint {
        operation: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportFailure>;
}

/// Posts the sanitized payload as JSON to `{base_url}/{operation}`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Result<Self, TransportFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // `join` replaces the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    pub fn endpoint(&self, operation: &str) -> Result<Url, TransportFailure> {
        self.base_url
            .join(operation.trim_start_matches('/'))
            .map_err(|source| TransportFailure::Endpoint {
                operation: operation.to_string(),
                source,
            })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportFailure> {
        let url = self.endpoint(&request.operation)?;
        let res = self
            .client
            .post(url)
            .headers(request.headers)
            .json(&request.payload)
            .send()
            .await?;

        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let text = res.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
