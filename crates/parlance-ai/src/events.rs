//! Streaming event types

use crate::types::{OutputItem, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted over the streaming response protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Response accepted; a response id is now assigned
    Created { response_id: String },
    /// Incremental text for one output item
    OutputTextDelta { item_id: String, delta: String },
    /// An output item settled (message text or a complete tool call)
    OutputItemDone { item: OutputItem },
    /// Response finished; all output items are final
    Completed {
        response_id: String,
        #[serde(default)]
        usage: Usage,
    },
    /// Response failed mid-stream
    Failed { message: String },
}

impl ProviderEvent {
    /// Check if this is a terminal event (Completed or Failed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderEvent::Completed { .. } | ProviderEvent::Failed { .. }
        )
    }
}

/// A stream of provider events
pub type ProviderEventStream = Pin<Box<dyn Stream<Item = ProviderEvent> + Send>>;
