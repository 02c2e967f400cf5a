use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, trace};

use maple_core::{
    CompletionRequest, CompletionResponse, Error, FinishReason, Message, Provider, StreamChunk,
    StreamResult, ToolCall, ToolDefinition, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and compatible servers.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        // SSE needs unbuffered bodies: stick to HTTP/1.1 and skip decompression.
        let client = Client::builder()
            .http1_only()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIChatRequest {
        // Request model wins over the provider default; with neither, the
        // server picks.
        let model = request
            .model
            .clone()
            .or_else(|| self.default_model.clone());

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(convert_tool).collect())
        };

        OpenAIChatRequest {
            model,
            messages: request.messages.iter().map(convert_message).collect(),
            temperature: request.temperature,
            stream: Some(request.stream),
            tools,
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
            extra: request.extra.clone(),
        }
    }

    fn parse_response(&self, response: OpenAIChatResponse) -> Result<CompletionResponse, Error> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api(500, "No choices in response"))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                ToolCall::new(
                    tc.id,
                    tc.function.name,
                    serde_json::from_str(&tc.function.arguments).unwrap_or_default(),
                )
            })
            .collect();

        let content = choice.message.content.unwrap_or_default();
        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tool_calls(content, tool_calls)
        };

        Ok(CompletionResponse {
            message,
            usage: response
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default(),
            model: response.model,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut req = request;
        req.stream = false;

        let api_request = self.build_request(&req);
        debug!(
            model = ?api_request.model,
            message_count = api_request.messages.len(),
            "OpenAI request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &error_text));
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;

        self.parse_response(api_response)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error> {
        let mut req = request;
        req.stream = true;

        let api_request = self.build_request(&req);
        debug!(
            model = ?api_request.model,
            message_count = api_request.messages.len(),
            has_tools = api_request.tools.is_some(),
            "OpenAI stream request"
        );
        trace!(request = %serde_json::to_string(&api_request).unwrap_or_default(), "OpenAI stream payload");

        let request_builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Accept-Encoding", "identity")
            .json(&api_request);

        let es = EventSource::new(request_builder).map_err(|e| Error::stream(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Result<StreamChunk, Error>>(100);

        tokio::spawn(async move {
            let mut es = es;
            let mut usage = None;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        debug!("OpenAI SSE connection opened");
                    }
                    Ok(Event::Message(msg)) => {
                        trace!(data = %msg.data, "OpenAI SSE chunk");

                        if msg.data.trim() == "[DONE]" {
                            break;
                        }

                        match serde_json::from_str::<OpenAIStreamResponse>(&msg.data) {
                            Ok(response) => {
                                if let Some(u) = &response.usage {
                                    usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                                }
                                for chunk in stream_chunks(response) {
                                    if tx.send(Ok(chunk)).await.is_err() {
                                        es.close();
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                error!(error = %e, data = %msg.data, "Failed to parse OpenAI SSE chunk");
                                let _ = tx
                                    .send(Err(Error::stream(format!("Failed to parse SSE: {}", e))))
                                    .await;
                                es.close();
                                return;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => {
                        debug!("OpenAI SSE stream ended");
                        break;
                    }
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response.text().await.unwrap_or_default();
                        let _ = tx.send(Err(parse_error(status.as_u16(), &body))).await;
                        es.close();
                        return;
                    }
                    Err(e) => {
                        error!(error = ?e, "OpenAI SSE error");
                        let _ = tx
                            .send(Err(Error::stream(format!("SSE error: {}", e))))
                            .await;
                        es.close();
                        return;
                    }
                }
            }

            es.close();
            let _ = tx.send(Ok(StreamChunk::Done { usage })).await;
        });

        let stream = ReceiverStream::new(rx);
        Ok(Box::pin(stream) as StreamResult)
    }
}

fn convert_message(message: &Message) -> OpenAIMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|tc| OpenAIToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };

    // Assistant turns that only carry tool calls send no content.
    let content = if message.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(message.content.clone())
    };

    OpenAIMessage {
        role: message.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn convert_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        r#type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: serde_json::to_value(&tool.parameters).unwrap_or_default(),
        },
    }
}

/// Flatten one SSE payload into stream chunks, in delta order.
fn stream_chunks(response: OpenAIStreamResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    for choice in response.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::Delta { content });
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let function = tc.function.unwrap_or_default();
            if let Some(id) = tc.id {
                chunks.push(StreamChunk::ToolCallStart {
                    id,
                    name: function.name.unwrap_or_default(),
                });
            }
            if let Some(arguments) = function.arguments.filter(|a| !a.is_empty()) {
                chunks.push(StreamChunk::ToolCallDelta { arguments });
            }
        }
    }

    chunks
}

fn parse_error(status: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match status {
            401 => Error::auth(err.error.message),
            429 => Error::rate_limit(err.error.message),
            400 => Error::invalid_request(err.error.message),
            _ => Error::api(status, err.error.message),
        },
        Err(_) => Error::api(status, body.to_string()),
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    /// Model to use. Optional for servers that have a default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    /// Extra parameters (reasoning_effort, etc.)
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCall {
    id: Option<String>,
    function: Option<OpenAIStreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
