//! parlance-ai: streaming LLM provider client
//!
//! This crate provides the wire types and SSE client for a responses-style
//! streaming API: submit conversation input items, receive incremental
//! output events, answer tool calls on the following request.

pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::{ProviderClient, ResponsesClient};
pub use error::{Error, Result};
pub use events::{ProviderEvent, ProviderEventStream};
pub use types::*;
