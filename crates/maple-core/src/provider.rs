use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::{Message, StreamChunk, Usage};
use crate::tool::ToolDefinition;

pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub stream: bool,
    /// Extra parameters passed through to the API (e.g. reasoning_effort)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            tools: Vec::new(),
            stream: true,
            extra: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_extra(mut self, extra: HashMap<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    pub fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Get the default model, if one is configured.
    /// Returns None if no default model is set (API will use its own default).
    fn default_model(&self) -> Option<&str>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error>;

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![Message::user("Hello")])
            .with_model("gpt-5-mini")
            .with_temperature(0.0);

        assert_eq!(request.model, Some("gpt-5-mini".to_string()));
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.stream);
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse(None), FinishReason::Stop);
    }
}
