//! maple-core: Core types and traits for maple
//!
//! This crate provides the provider/tool abstractions, the agent run loop,
//! and the translator that turns run events into UI status updates.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod status;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentConfig, ShoppingAgent};
pub use error::Error;
pub use event::{RunEvent, RunStream, ToolInvocation, FETCH_MANY_TOOL, SEARCH_MANY_TOOL};
pub use message::{Message, Role, StreamChunk, ToolCall, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, StreamResult};
pub use status::{
    translate, Phase, StatusKind, StatusLog, StatusTranslator, StatusUpdate, ToolDisplayNames,
};
pub use tool::{PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, ToolRegistry};

pub type Result<T> = std::result::Result<T, Error>;
