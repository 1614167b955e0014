//! Session event types

use serde::{Deserialize, Serialize};

/// Stream status for UI indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// A request is in flight
    Busy,
    /// No request in flight
    Idle,
    /// The last stream ended with a surfaced error
    Error,
}

/// Events emitted during session processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Stream status changed
    StreamStatus { status: StreamStatus },

    /// A new assistant message started streaming
    MessageBegan { message_id: String },

    /// Incremental text for a streaming assistant message
    MessageUpdated { message_id: String, delta: String },

    /// An assistant message finished; its text is now immutable
    MessageFinalized { message_id: String, text: String },

    /// The model requested a tool call; the tool layer should begin work
    ToolCallRequested {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A surfaced failure, already translated for display
    ErrorNotice { message: String },

    /// Number of queued intents changed (UI backpressure indicator)
    QueueDepth { depth: usize },
}
