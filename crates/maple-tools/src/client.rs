//! HTTP transport for the pure.md fetch/search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};

use maple_core::Error;

use crate::config::ToolsetConfig;

pub const API_TOKEN_HEADER: &str = "x-puremd-api-token";

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can issue a GET and hand back the body.
///
/// The toolset only ever talks to the network through this trait, so tests
/// can count, delay or fail requests without a server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, Error>;
}

/// Pooled reqwest client shared by every tool call.
///
/// Build it once and share the owning `Toolset`; clones of the inner
/// `reqwest::Client` reuse the same connection pool.
#[derive(Clone)]
pub struct PureMdClient {
    client: Client,
}

impl PureMdClient {
    pub fn new(config: &ToolsetConfig) -> Result<Self, Error> {
        Url::parse(config.base())
            .map_err(|e| Error::config(format!("Invalid base URL '{}': {}", config.base_url, e)))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| Error::config(format!("Invalid API key: {}", e)))?;
            headers.insert(API_TOKEN_HEADER, value);
        }

        let client = Client::builder()
            .user_agent(concat!("maple/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for PureMdClient {
    async fn get(&self, url: &str) -> Result<TransportResponse, Error> {
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(e.to_string())
    } else {
        Error::network(e.to_string())
    }
}
