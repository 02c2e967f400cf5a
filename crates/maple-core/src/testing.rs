//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{Message, StreamChunk, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, StreamResult};

/// A provider that replays scripted streaming responses.
///
/// Each queued script answers one `stream()` (or `complete()`) call, in FIFO
/// order. With nothing queued, calls fail.
pub struct MockProvider {
    scripts: Mutex<VecDeque<Vec<StreamChunk>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            captured_requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw chunk script.
    pub fn queue_chunks(&self, chunks: Vec<StreamChunk>) {
        self.scripts.lock().unwrap().push_back(chunks);
    }

    /// Queue a plain text answer delivered as the given deltas.
    pub fn queue_stream_text(&self, deltas: &[&str]) {
        let mut chunks: Vec<StreamChunk> = deltas
            .iter()
            .map(|d| StreamChunk::Delta {
                content: d.to_string(),
            })
            .collect();
        chunks.push(StreamChunk::Done {
            usage: Some(Usage::new(10, deltas.len() as u32)),
        });
        self.queue_chunks(chunks);
    }

    /// Queue a response that asks for a single tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) {
        let args = arguments.to_string();
        let mid = (0..=args.len() / 2)
            .rev()
            .find(|i| args.is_char_boundary(*i))
            .unwrap_or(0);
        let (head, tail) = args.split_at(mid);
        self.queue_chunks(vec![
            StreamChunk::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamChunk::ToolCallDelta {
                arguments: head.to_string(),
            },
            StreamChunk::ToolCallDelta {
                arguments: tail.to_string(),
            },
            StreamChunk::Done { usage: None },
        ]);
    }

    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }

    fn next_script(&self, request: CompletionRequest) -> Result<Vec<StreamChunk>, Error> {
        self.captured_requests.lock().unwrap().push(request);
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Unknown("No mock response queued".to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> Option<&str> {
        None
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut args = Vec::new();

        for chunk in self.next_script(request)? {
            match chunk {
                StreamChunk::Delta { content: delta } => content.push_str(&delta),
                StreamChunk::ToolCallStart { id, name } => {
                    tool_calls.push(ToolCall::new(id, name, serde_json::Value::Null));
                    args.push(String::new());
                }
                StreamChunk::ToolCallDelta { arguments } => {
                    if let Some(last) = args.last_mut() {
                        last.push_str(&arguments);
                    }
                }
                StreamChunk::Done { .. } => {}
            }
        }
        for (call, raw) in tool_calls.iter_mut().zip(args) {
            call.arguments = serde_json::from_str(&raw)?;
        }

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        Ok(CompletionResponse {
            message: Message::assistant_with_tool_calls(content, tool_calls),
            usage: Usage::default(),
            model: "mock-model".to_string(),
            finish_reason,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error> {
        let chunks = self.next_script(request)?;
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}
