//! The four fetch/search operations.
//!
//! Single-item calls go straight to the transport (through the cache) and
//! apply the configured [`FailurePolicy`]. Batch calls deduplicate and cap
//! their input, then fan out one future per item behind a semaphore shared
//! by every batch on this `Toolset`, so the cap holds across concurrent
//! batches too. Batch items never fail: errors become empty strings.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use reqwest::Url;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info};

use maple_core::Error;

use crate::cache::ResponseCache;
use crate::client::{PureMdClient, Transport, TransportResponse};
use crate::config::{FailurePolicy, ToolsetConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Fetch,
    Search,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Search => "search",
        }
    }

    fn cache_key(self, input: &str) -> String {
        format!("{}:{}", self.as_str(), input)
    }

    /// Turn a response into a body, or an error if this operation rejects it.
    fn accept(self, response: TransportResponse) -> Result<String, Error> {
        let ok = match self {
            Operation::Fetch => response.status == 200,
            Operation::Search => response.is_success(),
        };
        if ok {
            Ok(response.body)
        } else {
            Err(Error::api(
                response.status,
                format!("{} returned HTTP {}", self.as_str(), response.status),
            ))
        }
    }
}

/// Results of a batch call, in deduplicated input order.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResults(Vec<(String, String)>);

impl BatchResults {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for BatchResults {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for BatchResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Fetch/search operations over one transport, one cache and one admission gate.
pub struct Toolset {
    config: ToolsetConfig,
    transport: Arc<dyn Transport>,
    permits: Semaphore,
    cache: ResponseCache,
}

impl Toolset {
    /// Build a toolset backed by a pooled [`PureMdClient`].
    pub fn new(config: ToolsetConfig) -> Result<Self, Error> {
        let client = PureMdClient::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(client)))
    }

    pub fn with_transport(config: ToolsetConfig, transport: Arc<dyn Transport>) -> Self {
        let permits = Semaphore::new(config.max_parallel.max(1));
        let cache = ResponseCache::new(config.cache_ttl());
        Self {
            config,
            transport,
            permits,
            cache,
        }
    }

    pub fn config(&self) -> &ToolsetConfig {
        &self.config
    }

    /// Fetch one page. Blank input returns `""` without a request.
    pub async fn fetch_url_contents(&self, url: &str) -> Result<String, Error> {
        self.single(Operation::Fetch, url, self.config.fetch_failure)
            .await
    }

    /// Run one search. Blank input returns `""` without a request.
    pub async fn search_web(&self, query: &str) -> Result<String, Error> {
        self.single(Operation::Search, query, self.config.search_failure)
            .await
    }

    pub async fn fetch_urls(&self, urls: &[String]) -> BatchResults {
        self.batch(Operation::Fetch, urls, self.config.max_urls)
            .await
    }

    pub async fn search_web_multi(&self, queries: &[String]) -> BatchResults {
        self.batch(Operation::Search, queries, self.config.max_queries)
            .await
    }

    async fn single(
        &self,
        op: Operation,
        input: &str,
        policy: FailurePolicy,
    ) -> Result<String, Error> {
        if input.trim().is_empty() {
            return Ok(String::new());
        }

        let result = match self.cached(op, input) {
            Some(hit) => Ok(hit),
            None => self.request(op, input).await,
        };

        match (result, policy) {
            (Ok(body), _) => Ok(body),
            (Err(e), FailurePolicy::Swallow) => {
                debug!(operation = op.as_str(), input, error = %e, "Request failed, returning empty");
                Ok(String::new())
            }
            (Err(e), FailurePolicy::Propagate) => Err(e),
        }
    }

    async fn batch(&self, op: Operation, inputs: &[String], cap: usize) -> BatchResults {
        let started = Instant::now();
        let items = dedup_capped(inputs, cap);

        let bodies = join_all(items.iter().map(|item| self.batch_item(op, item))).await;

        info!(
            operation = op.as_str(),
            items = items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );

        BatchResults(items.into_iter().zip(bodies).collect())
    }

    async fn batch_item(&self, op: Operation, input: &str) -> String {
        if input.trim().is_empty() {
            return String::new();
        }

        let result = match self.cached(op, input) {
            Some(hit) => Ok(hit),
            None => match self.permits.acquire().await {
                Ok(_permit) => self.request(op, input).await,
                Err(e) => Err(Error::Unknown(e.to_string())),
            },
        };

        match result {
            Ok(body) => truncate_chars(body, self.config.max_chars_per_result),
            Err(e) => {
                debug!(operation = op.as_str(), input, error = %e, "Batch item failed");
                String::new()
            }
        }
    }

    fn cached(&self, op: Operation, input: &str) -> Option<String> {
        let hit = self.cache.get(&op.cache_key(input));
        if hit.is_some() {
            debug!(operation = op.as_str(), input, "Cache hit");
        }
        hit
    }

    async fn request(&self, op: Operation, input: &str) -> Result<String, Error> {
        let url = self.request_url(op, input)?;
        let response = self.transport.get(&url).await?;
        let body = op.accept(response)?;
        self.cache.insert(op.cache_key(input), body.clone());
        Ok(body)
    }

    /// Search queries are form-encoded, so a space becomes `+` rather than `%20`.
    fn request_url(&self, op: Operation, input: &str) -> Result<String, Error> {
        let base = self.config.base();
        match op {
            Operation::Fetch => Ok(format!("{}/{}", base, input.trim())),
            Operation::Search => {
                let url = Url::parse_with_params(&format!("{}/search", base), &[("q", input)])
                    .map_err(|e| Error::config(format!("Invalid base URL '{}': {}", base, e)))?;
                Ok(url.to_string())
            }
        }
    }
}

/// Drop repeats (first occurrence wins) and keep at most `cap` items.
fn dedup_capped(items: &[String], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .take(cap)
        .cloned()
        .collect()
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const BASE: &str = "http://pure.test";

    /// Records calls, tracks peak concurrency and serves canned responses.
    #[derive(Default)]
    struct MockTransport {
        statuses: HashMap<String, u16>,
        bodies: HashMap<String, String>,
        broken: HashSet<String>,
        delay: Duration,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockTransport {
        fn new() -> Self {
            Self::default()
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_status(mut self, path: &str, status: u16) -> Self {
            self.statuses.insert(format!("{}/{}", BASE, path), status);
            self
        }

        fn with_body(mut self, path: &str, body: impl Into<String>) -> Self {
            self.bodies.insert(format!("{}/{}", BASE, path), body.into());
            self
        }

        fn broken(mut self, path: &str) -> Self {
            self.broken.insert(format!("{}/{}", BASE, path));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(&self, url: &str) -> Result<TransportResponse, Error> {
            self.calls.lock().unwrap().push(url.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.contains(url) {
                return Err(Error::network("connection reset"));
            }
            let status = self.statuses.get(url).copied().unwrap_or(200);
            let body = self
                .bodies
                .get(url)
                .cloned()
                .unwrap_or_else(|| format!("body of {}", url));
            Ok(TransportResponse::new(status, body))
        }
    }

    fn toolset(transport: Arc<MockTransport>) -> Toolset {
        Toolset::with_transport(ToolsetConfig::new(BASE), transport)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_duplicate_urls_fetched_once() {
        let transport = Arc::new(MockTransport::new());
        let results = toolset(transport.clone())
            .fetch_urls(&strings(&["a", "a", "b"]))
            .await;

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(results.get("a"), Some("body of http://pure.test/a"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_queries_capped_at_three() {
        let transport = Arc::new(MockTransport::new());
        let results = toolset(transport.clone())
            .search_web_multi(&strings(&["q1", "q2", "q3", "q4"]))
            .await;

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["q1", "q2", "q3"]);
        assert!(!results.contains_key("q4"));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_key_set_is_deduplicated_input() {
        let transport = Arc::new(MockTransport::new());
        let config = ToolsetConfig {
            max_urls: 3,
            ..ToolsetConfig::new(BASE)
        };
        let set = Toolset::with_transport(config, transport.clone());

        let results = set
            .fetch_urls(&strings(&["c", "  ", "c", "a", "b", "a"]))
            .await;

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["c", "  ", "a"]);
        assert_eq!(results.get("  "), Some(""));
        // The blank entry never reaches the network.
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_items_are_isolated() {
        let transport = Arc::new(
            MockTransport::new()
                .with_status("missing", 404)
                .broken("reset"),
        );
        let results = toolset(transport)
            .fetch_urls(&strings(&["ok", "missing", "reset", "also-ok"]))
            .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results.get("missing"), Some(""));
        assert_eq!(results.get("reset"), Some(""));
        assert_eq!(results.get("ok"), Some("body of http://pure.test/ok"));
        assert_eq!(results.get("also-ok"), Some("body of http://pure.test/also-ok"));
    }

    #[tokio::test]
    async fn test_search_batch_swallows_server_errors() {
        let transport = Arc::new(MockTransport::new().with_status("search?q=down", 503));
        let results = toolset(transport)
            .search_web_multi(&strings(&["down", "up"]))
            .await;

        assert_eq!(results.get("down"), Some(""));
        assert_eq!(results.get("up"), Some("body of http://pure.test/search?q=up"));
    }

    #[tokio::test]
    async fn test_truncation_is_exact() {
        let long = "é".repeat(5000);
        let transport = Arc::new(MockTransport::new().with_body("long", long).with_body("short", "tiny"));
        let results = toolset(transport)
            .fetch_urls(&strings(&["long", "short"]))
            .await;

        assert_eq!(results.get("long").unwrap().chars().count(), 4000);
        assert_eq!(results.get("short"), Some("tiny"));
    }

    #[tokio::test]
    async fn test_single_fetch_is_not_truncated() {
        let transport = Arc::new(MockTransport::new().with_body("long", "x".repeat(5000)));
        let body = toolset(transport).fetch_url_contents("long").await.unwrap();
        assert_eq!(body.len(), 5000);
    }

    #[tokio::test]
    async fn test_batch_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let config = ToolsetConfig::new(BASE).with_cache_ttl(Duration::ZERO);
        let set = Toolset::with_transport(config, transport.clone());
        let urls = strings(&["a", "b"]);

        let first = set.fetch_urls(&urls).await;
        let second = set.fetch_urls(&urls).await;

        assert_eq!(first, second);
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_cap() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
        let set = toolset(transport.clone());
        let urls: Vec<String> = (0..12).map(|i| format!("page-{}", i)).collect();

        let results = set.fetch_urls(&urls).await;

        assert_eq!(results.len(), 12);
        assert_eq!(transport.peak(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_cap_is_honoured() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
        let config = ToolsetConfig::new(BASE).with_max_parallel(2);
        let set = Toolset::with_transport(config, transport.clone());
        let urls: Vec<String> = (0..7).map(|i| format!("page-{}", i)).collect();

        let results = set.fetch_urls(&urls).await;

        assert_eq!(results.len(), 7);
        assert_eq!(transport.peak(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_is_shared_between_batches() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
        let set = toolset(transport.clone());
        let urls: Vec<String> = (0..6).map(|i| format!("page-{}", i)).collect();
        let queries = strings(&["boots", "toques", "parkas"]);

        let (fetched, searched) = tokio::join!(set.fetch_urls(&urls), set.search_web_multi(&queries));

        assert_eq!(fetched.len(), 6);
        assert_eq!(searched.len(), 3);
        assert!(transport.peak() <= 5);
        assert_eq!(transport.calls().len(), 9);
    }

    #[tokio::test]
    async fn test_blank_single_inputs_skip_network() {
        let transport = Arc::new(MockTransport::new());
        let set = toolset(transport.clone());

        assert_eq!(set.fetch_url_contents("").await.unwrap(), "");
        assert_eq!(set.fetch_url_contents("   ").await.unwrap(), "");
        assert_eq!(set.search_web("").await.unwrap(), "");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let transport = Arc::new(MockTransport::new());
        let results = toolset(transport.clone()).fetch_urls(&[]).await;
        assert!(results.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_swallows_and_search_propagates() {
        let transport = Arc::new(
            MockTransport::new()
                .with_status("gone", 500)
                .with_status("search?q=gone", 500),
        );
        let set = toolset(transport);

        assert_eq!(set.fetch_url_contents("gone").await.unwrap(), "");
        let err = set.search_web("gone").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_search_policy_can_swallow() {
        let transport = Arc::new(MockTransport::new().broken("search?q=gone"));
        let config = ToolsetConfig::new(BASE).with_search_failure(FailurePolicy::Swallow);
        let set = Toolset::with_transport(config, transport);

        assert_eq!(set.search_web("gone").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_fetch_policy_can_propagate() {
        let transport = Arc::new(MockTransport::new().with_status("gone", 404));
        let config = ToolsetConfig::new(BASE).with_fetch_failure(FailurePolicy::Propagate);
        let set = Toolset::with_transport(config, transport);

        assert!(set.fetch_url_contents("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_accepts_only_200() {
        let transport = Arc::new(MockTransport::new().with_status("created", 201));
        let set = toolset(transport);
        assert_eq!(set.fetch_url_contents("created").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_search_query_is_encoded() {
        let transport = Arc::new(MockTransport::new());
        let set = toolset(transport.clone());

        set.search_web("canadian boots & parkas").await.unwrap();

        assert_eq!(
            transport.calls(),
            vec!["http://pure.test/search?q=canadian+boots+%26+parkas".to_string()]
        );
    }

    #[tokio::test]
    async fn test_repeat_fetch_hits_cache() {
        let transport = Arc::new(MockTransport::new());
        let set = toolset(transport.clone());

        let first = set.fetch_url_contents("a").await.unwrap();
        let second = set.fetch_url_contents("a").await.unwrap();
        let batch = set.fetch_urls(&strings(&["a"])).await;

        assert_eq!(first, second);
        assert_eq!(batch.get("a"), Some(first.as_str()));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let transport = Arc::new(MockTransport::new().with_status("flaky", 500));
        let set = toolset(transport.clone());

        set.fetch_url_contents("flaky").await.unwrap();
        set.fetch_url_contents("flaky").await.unwrap();

        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_batch_results_serialize_in_order() {
        let results = BatchResults(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(serde_json::to_string(&results).unwrap(), r#"{"b":"2","a":"1"}"#);
    }

    #[test]
    fn test_truncate_chars_on_multibyte() {
        assert_eq!(truncate_chars("héllo".to_string(), 2), "hé");
        assert_eq!(truncate_chars("hi".to_string(), 10), "hi");
        assert_eq!(truncate_chars("abc".to_string(), 0), "");
    }
}
