//! Agent-facing tools over a shared [`Toolset`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use maple_core::{
    Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, FETCH_MANY_TOOL,
    SEARCH_MANY_TOOL,
};

use crate::toolset::{BatchResults, Toolset};

// =============================================================================
// Argument helpers
// =============================================================================

/// A string argument, or `""` when missing or not a string.
fn string_arg<'a>(arguments: &'a Value, key: &str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or("")
}

/// The string items of a list argument; anything else is ignored.
fn list_arg(arguments: &Value, key: &str) -> Vec<String> {
    arguments
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn batch_output(results: &BatchResults) -> Result<ToolOutput, Error> {
    Ok(ToolOutput::success(serde_json::to_string(results)?))
}

// =============================================================================
// Single-item tools
// =============================================================================

pub struct FetchUrlContentsTool {
    toolset: Arc<Toolset>,
}

impl FetchUrlContentsTool {
    pub fn new(toolset: Arc<Toolset>) -> Self {
        Self { toolset }
    }
}

#[async_trait]
impl Tool for FetchUrlContentsTool {
    fn name(&self) -> &str {
        "fetch_url_contents"
    }

    fn description(&self) -> &str {
        "Fetch the contents of a single URL. Use this when you only need ONE page; \
         for several pages prefer fetch_urls. Returns the raw page text, or an empty \
         string if the page could not be fetched."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property(
                "url",
                PropertySchema::string(
                    "Relative or absolute URL to fetch (e.g. 'article/123' or 'https://...')",
                ),
                true,
            ),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let url = string_arg(&arguments, "url");
        let body = self
            .toolset
            .fetch_url_contents(url)
            .await
            .map_err(|e| Error::tool(self.name(), e.to_string()))?;
        Ok(ToolOutput::success(body))
    }
}

pub struct SearchWebTool {
    toolset: Arc<Toolset>,
}

impl SearchWebTool {
    pub fn new(toolset: Arc<Toolset>) -> Self {
        Self { toolset }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Run a single web search query. Use this when you only need ONE query; for \
         several related queries prefer search_web_multi. Returns the raw search results."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property(
                "query",
                PropertySchema::string("A clear, specific search term or question"),
                true,
            ),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let query = string_arg(&arguments, "query");
        let body = self
            .toolset
            .search_web(query)
            .await
            .map_err(|e| Error::tool(self.name(), format!("Search failed: {}", e)))?;
        Ok(ToolOutput::success(body))
    }
}

// =============================================================================
// Batch tools
// =============================================================================

pub struct FetchUrlsTool {
    toolset: Arc<Toolset>,
}

impl FetchUrlsTool {
    pub fn new(toolset: Arc<Toolset>) -> Self {
        Self { toolset }
    }
}

#[async_trait]
impl Tool for FetchUrlsTool {
    fn name(&self) -> &str {
        FETCH_MANY_TOOL
    }

    fn description(&self) -> &str {
        "Fetch multiple URLs in parallel. Prefer this over repeated fetch_url_contents calls \
         when reading several product pages, brand sites or reviews. Keep the list short \
         (fewer than 5). Returns a JSON object mapping each URL to its text (empty if the \
         fetch failed); each result is limited to a few thousand characters."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property(
                "urls",
                PropertySchema::string_array("Relative or absolute URLs to fetch"),
                true,
            ),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let urls = list_arg(&arguments, "urls");
        batch_output(&self.toolset.fetch_urls(&urls).await)
    }
}

pub struct SearchWebMultiTool {
    toolset: Arc<Toolset>,
}

impl SearchWebMultiTool {
    pub fn new(toolset: Arc<Toolset>) -> Self {
        Self { toolset }
    }
}

#[async_trait]
impl Tool for SearchWebMultiTool {
    fn name(&self) -> &str {
        SEARCH_MANY_TOOL
    }

    fn description(&self) -> &str {
        "Run several web search queries in parallel. Prefer this over repeated search_web \
         calls (brand variations, 'made in Canada' checks, model families). At most 3 \
         queries are run. Returns a JSON object mapping each query to its raw results \
         (empty if the search failed). Afterwards, pick the best candidates and call \
         fetch_urls once for details."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property(
                "queries",
                PropertySchema::string_array("Search strings to run"),
                true,
            ),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
        let queries = list_arg(&arguments, "queries");
        batch_output(&self.toolset.search_web_multi(&queries).await)
    }
}

// =============================================================================
// Factory functions
// =============================================================================

/// All four web tools sharing one toolset.
pub fn create_web_tools(toolset: Arc<Toolset>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FetchUrlContentsTool::new(Arc::clone(&toolset))),
        Arc::new(SearchWebTool::new(Arc::clone(&toolset))),
        Arc::new(FetchUrlsTool::new(Arc::clone(&toolset))),
        Arc::new(SearchWebMultiTool::new(toolset)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Transport, TransportResponse};
    use crate::config::ToolsetConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
        status: u16,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn get(&self, url: &str) -> Result<TransportResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::new(self.status, url.rsplit('/').next().unwrap_or("")))
        }
    }

    fn tools(status: u16) -> (Vec<Arc<dyn Tool>>, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            status,
        });
        let toolset = Toolset::with_transport(ToolsetConfig::new("http://pure.test"), transport.clone());
        (create_web_tools(Arc::new(toolset)), transport)
    }

    fn find(tools: &[Arc<dyn Tool>], name: &str) -> Arc<dyn Tool> {
        tools.iter().find(|t| t.name() == name).cloned().unwrap()
    }

    #[test]
    fn test_factory_names() {
        let (tools, _) = tools(200);
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["fetch_url_contents", "fetch_urls", "search_web", "search_web_multi"]
        );
    }

    #[test]
    fn test_batch_definition_is_string_array() {
        let (tools, _) = tools(200);
        let def = find(&tools, "fetch_urls").definition();
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["parameters"]["properties"]["urls"]["type"], "array");
        assert_eq!(json["parameters"]["properties"]["urls"]["items"]["type"], "string");
    }

    #[tokio::test]
    async fn test_fetch_urls_returns_json_object() {
        let (tools, transport) = tools(200);
        let output = find(&tools, "fetch_urls")
            .execute(json!({"urls": ["roots", 7, "kombi", "roots"]}))
            .await
            .unwrap();

        assert_eq!(output.content, r#"{"roots":"roots","kombi":"kombi"}"#);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_empty_input() {
        let (tools, transport) = tools(200);

        let single = find(&tools, "fetch_url_contents")
            .execute(json!({"url": 42}))
            .await
            .unwrap();
        let batch = find(&tools, "search_web_multi")
            .execute(json!({"queries": "not a list"}))
            .await
            .unwrap();

        assert_eq!(single.content, "");
        assert_eq!(batch.content, "{}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_failure_is_tool_error() {
        let (tools, _) = tools(500);
        let result = find(&tools, "search_web")
            .execute(json!({"query": "toques"}))
            .await;
        assert!(matches!(result, Err(Error::Tool { .. })));
    }
}
