//! Toolset configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://pure.md";

/// What a single-item operation does when the upstream call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Return an empty string.
    Swallow,
    /// Return the error to the caller.
    Propagate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsetConfig {
    /// Base URL of the fetch/search endpoint.
    pub base_url: String,
    /// Sent as the `x-puremd-api-token` header when set.
    pub api_key: Option<String>,
    /// Maximum in-flight batch requests across the whole toolset.
    pub max_parallel: usize,
    /// Cap on distinct URLs per `fetch_urls` call.
    pub max_urls: usize,
    /// Cap on distinct queries per `search_web_multi` call.
    pub max_queries: usize,
    /// Batch results are cut to this many characters.
    pub max_chars_per_result: usize,
    pub timeout_secs: u64,
    /// Zero disables the response cache.
    pub cache_ttl_secs: u64,
    /// Idle connections kept per host. reqwest has no cap on total open
    /// connections; in-flight requests are bounded by `max_parallel`.
    pub max_connections: usize,
    pub fetch_failure: FailurePolicy,
    pub search_failure: FailurePolicy,
}

impl Default for ToolsetConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            max_parallel: 5,
            max_urls: 50,
            max_queries: 3,
            max_chars_per_result: 4000,
            timeout_secs: 5,
            cache_ttl_secs: 60 * 60,
            max_connections: 20,
            fetch_failure: FailurePolicy::Swallow,
            search_failure: FailurePolicy::Propagate,
        }
    }
}

impl ToolsetConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_search_failure(mut self, policy: FailurePolicy) -> Self {
        self.search_failure = policy;
        self
    }

    pub fn with_fetch_failure(mut self, policy: FailurePolicy) -> Self {
        self.fetch_failure = policy;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
