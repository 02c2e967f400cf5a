//! The agent run loop.
//!
//! An agent streams a completion, executes any tool calls the model asks for,
//! feeds the results back and repeats until the model answers without tools.
//! Everything observable about the run is reported as [`RunEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::error::Error;
use crate::event::{RunEvent, RunStream, ToolInvocation};
use crate::message::{Message, StreamChunk, ToolCall};
use crate::provider::{CompletionRequest, Provider};
use crate::tool::ToolRegistry;

const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_iterations: usize,
    /// Extra provider parameters (e.g. reasoning_effort).
    pub parameters: HashMap<String, Value>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            model: None,
            temperature: None,
            max_iterations: 20,
            parameters: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    fn request(&self, messages: Vec<Message>, tools: &ToolRegistry) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages)
            .with_tools(tools.definitions())
            .with_extra(self.parameters.clone());
        if let Some(model) = &self.model {
            request = request.with_model(model.as_str());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}

/// An LLM agent equipped with the shopping tools.
#[derive(Clone)]
pub struct ShoppingAgent {
    config: AgentConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
}

impl ShoppingAgent {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            config,
            provider,
            tools,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a run for `prompt` on top of prior conversation `history`.
    ///
    /// The run executes on a spawned task. Dropping the returned stream stops
    /// it at the next event.
    pub fn run(&self, history: Vec<Message>, prompt: &str) -> RunStream {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.config.system_prompt {
            messages.push(Message::system(system.as_str()));
        }
        messages.extend(history);
        messages.push(Message::user(prompt));

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = self.clone();

        tokio::spawn(async move {
            if let Err(e) = agent.run_loop(messages, &tx).await {
                debug!(agent = %agent.config.name, error = %e, "Agent run failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn run_loop(
        &self,
        mut messages: Vec<Message>,
        tx: &mpsc::Sender<Result<RunEvent, Error>>,
    ) -> Result<(), Error> {
        let name = &self.config.name;

        for iteration in 0..self.config.max_iterations {
            debug!(
                agent = %name,
                iteration,
                message_count = messages.len(),
                "Agent iteration starting"
            );

            let request = self.config.request(messages.clone(), &self.tools);
            let mut stream = self.provider.stream(request).await?;

            let mut content = String::new();
            let mut pending: Vec<(String, String, String)> = Vec::new();

            while let Some(chunk) = stream.next().await {
                match chunk? {
                    StreamChunk::Delta { content: delta } => {
                        content.push_str(&delta);
                        if !emit(tx, RunEvent::Content(delta)).await {
                            return Ok(());
                        }
                    }
                    StreamChunk::ToolCallStart { id, name } => {
                        pending.push((id, name, String::new()));
                    }
                    StreamChunk::ToolCallDelta { arguments } => {
                        if let Some((_, _, args)) = pending.last_mut() {
                            args.push_str(&arguments);
                        }
                    }
                    StreamChunk::Done { usage } => {
                        if let Some(usage) = usage {
                            debug!(
                                agent = %name,
                                prompt_tokens = usage.prompt_tokens,
                                completion_tokens = usage.completion_tokens,
                                "Completion usage"
                            );
                        }
                    }
                }
            }

            if pending.is_empty() {
                info!(agent = %name, iterations = iteration + 1, "Agent run finished");
                return Ok(());
            }

            let tool_calls: Vec<ToolCall> = pending
                .into_iter()
                .map(|(id, name, args)| {
                    let arguments = serde_json::from_str(&args)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    ToolCall::new(id, name, arguments)
                })
                .collect();

            messages.push(Message::assistant_with_tool_calls(content, tool_calls.clone()));

            for call in &tool_calls {
                let invocation = ToolInvocation::from_call(&call.name, &call.arguments);
                if !emit(tx, RunEvent::ToolCallStarted(invocation)).await {
                    return Ok(());
                }

                debug!(agent = %name, tool = %call.name, arguments = %call.arguments, "Executing tool");
                let (result, is_error) = self.tools.execute_call(call).await;
                debug!(
                    agent = %name,
                    tool = %call.name,
                    is_error,
                    result_len = result.len(),
                    "Tool finished"
                );

                let completed = RunEvent::ToolCallCompleted {
                    name: call.name.clone(),
                };
                if !emit(tx, completed).await {
                    return Ok(());
                }
                messages.push(Message::tool_result(&call.id, result));
            }
        }

        Err(Error::Unknown(format!(
            "Agent {} exceeded max iterations ({})",
            name, self.config.max_iterations
        )))
    }
}

/// Returns false once the consumer has gone away.
async fn emit(tx: &mpsc::Sender<Result<RunEvent, Error>>, event: RunEvent) -> bool {
    tx.send(Ok(event)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use crate::tool::{Tool, ToolDefinition, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;

    struct StubSearch;

    #[async_trait]
    impl Tool for StubSearch {
        fn name(&self) -> &str {
            "search_web_multi"
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name(), self.description())
        }

        async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
            Ok(ToolOutput::success(arguments.to_string()))
        }
    }

    fn agent(provider: Arc<MockProvider>) -> ShoppingAgent {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StubSearch));
        ShoppingAgent::new(
            provider,
            Arc::new(tools),
            AgentConfig::new("test").with_system_prompt("Be Canadian."),
        )
    }

    #[tokio::test]
    async fn test_tool_round_trip_emits_events() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("call-1", "search_web_multi", json!({"queries": ["toques"]}));
        provider.queue_stream_text(&["Try ", "Kombi."]);

        let events: Vec<RunEvent> = agent(provider.clone())
            .run(Vec::new(), "warm hats?")
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                RunEvent::ToolCallStarted(ToolInvocation::SearchMany {
                    queries: vec!["toques".into()]
                }),
                RunEvent::ToolCallCompleted {
                    name: "search_web_multi".into()
                },
                RunEvent::Content("Try ".into()),
                RunEvent::Content("Kombi.".into()),
            ]
        );

        let second = provider.last_request().unwrap();
        assert_eq!(second.messages[0].content, "Be Canadian.");
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call-1"));
        assert!(tool_msg.content.contains("toques"));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_abort_run() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("call-1", "teleport", json!({}));
        provider.queue_stream_text(&["Sorry."]);

        let events: Vec<RunEvent> = agent(provider.clone())
            .run(Vec::new(), "hi")
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        let last = provider.last_request().unwrap();
        assert!(last.messages.last().unwrap().content.starts_with("Error: Unknown tool"));
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let provider = Arc::new(MockProvider::new());

        let results: Vec<Result<RunEvent, Error>> =
            agent(provider).run(Vec::new(), "hi").collect().await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("a", "search_web_multi", json!({"queries": ["x"]}));
        provider.queue_tool_call("b", "search_web_multi", json!({"queries": ["y"]}));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StubSearch));
        let agent = ShoppingAgent::new(
            provider.clone(),
            Arc::new(tools),
            AgentConfig::new("loopy").with_max_iterations(2),
        );

        let results: Vec<Result<RunEvent, Error>> = agent.run(Vec::new(), "hi").collect().await;
        assert!(matches!(results.last(), Some(Err(Error::Unknown(_)))));
        assert_eq!(provider.request_count(), 2);
    }
}
