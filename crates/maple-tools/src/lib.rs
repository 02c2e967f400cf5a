//! maple-tools: the fetch/search toolset for maple
//!
//! This crate provides the tools the shopping agent uses to reach the web:
//! - Single fetch and search against a pure.md endpoint
//! - Batch fetch and search with deduplication, caps and bounded concurrency
//! - A short-lived response cache in front of the network

pub mod cache;
pub mod client;
pub mod config;
pub mod toolset;
pub mod web;

pub use cache::ResponseCache;
pub use client::{PureMdClient, Transport, TransportResponse};
pub use config::{FailurePolicy, ToolsetConfig, DEFAULT_BASE_URL};
pub use toolset::{BatchResults, Toolset};
pub use web::{
    create_web_tools, FetchUrlContentsTool, FetchUrlsTool, SearchWebMultiTool, SearchWebTool,
};
