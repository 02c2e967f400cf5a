//! Events produced while an agent run is in progress.

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;

use crate::error::Error;

/// Tool name of the batch search tool.
pub const SEARCH_MANY_TOOL: &str = "search_web_multi";
/// Tool name of the batch fetch tool.
pub const FETCH_MANY_TOOL: &str = "fetch_urls";

pub type RunStream = Pin<Box<dyn Stream<Item = Result<RunEvent, Error>> + Send>>;

/// One step of an agent run, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A chunk of the visible response.
    Content(String),
    /// The agent invoked a tool.
    ToolCallStarted(ToolInvocation),
    /// A tool finished (successfully or not).
    ToolCallCompleted { name: String },
}

/// Which tool an agent invoked, with the arguments the UI cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SearchMany { queries: Vec<String> },
    FetchMany { urls: Vec<String> },
    Other { name: String, arguments: Value },
}

impl ToolInvocation {
    /// Classify a raw tool call.
    ///
    /// The batch tools only get their own variant when the list argument is
    /// present and holds at least one string.
    pub fn from_call(name: &str, arguments: &Value) -> Self {
        let batch = match name {
            SEARCH_MANY_TOOL => {
                string_list(arguments, "queries").map(|queries| ToolInvocation::SearchMany { queries })
            }
            FETCH_MANY_TOOL => string_list(arguments, "urls").map(|urls| ToolInvocation::FetchMany { urls }),
            _ => None,
        };

        batch.unwrap_or_else(|| ToolInvocation::Other {
            name: name.to_string(),
            arguments: arguments.clone(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ToolInvocation::SearchMany { .. } => SEARCH_MANY_TOOL,
            ToolInvocation::FetchMany { .. } => FETCH_MANY_TOOL,
            ToolInvocation::Other { name, .. } => name,
        }
    }
}

fn string_list(arguments: &Value, key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = arguments
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_search_many() {
        let inv = ToolInvocation::from_call("search_web_multi", &json!({"queries": ["a", "b"]}));
        assert_eq!(
            inv,
            ToolInvocation::SearchMany {
                queries: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(inv.name(), "search_web_multi");
    }

    #[test]
    fn test_classify_fetch_many() {
        let inv = ToolInvocation::from_call("fetch_urls", &json!({"urls": ["x.ca"]}));
        assert!(matches!(inv, ToolInvocation::FetchMany { ref urls } if urls.len() == 1));
    }

    #[test]
    fn test_missing_list_falls_back_to_other() {
        let inv = ToolInvocation::from_call("search_web_multi", &json!({}));
        assert!(matches!(inv, ToolInvocation::Other { ref name, .. } if name == "search_web_multi"));

        let inv = ToolInvocation::from_call("fetch_urls", &json!({"urls": []}));
        assert!(matches!(inv, ToolInvocation::Other { .. }));
    }
}
