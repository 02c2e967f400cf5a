//! maple-providers: LLM provider implementations for maple
//!
//! This crate provides an OpenAI-compatible implementation of the Provider
//! trait, usable with any server that speaks the chat-completions API.

pub mod openai;

pub use openai::{OpenAIProvider, DEFAULT_BASE_URL};
