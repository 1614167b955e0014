//! Outbound request intents

use parlance_ai::ToolChoice;
use serde::{Deserialize, Serialize};

use crate::entry::ToolCallStatus;

/// A tool result ready for submission to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponsePayload {
    /// Provider-issued call id this result answers
    pub call_id: String,
    /// Result payload
    pub output: serde_json::Value,
    /// Final status of the call
    pub status: ToolCallStatus,
}

/// One queued outbound request, owned by the queue once enqueued
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamIntent {
    /// A user-visible conversation turn
    UserMessage {
        text: String,
        is_system_generated: bool,
        correlation_id: String,
        /// Explicit tool-choice override; `None` defers to session policy
        tool_choice: Option<ToolChoice>,
    },
    /// A workflow-injected message from the surrounding application
    CoordinatorMessage { text: String },
    /// A single tool result
    ToolResponse { payload: ToolResponsePayload },
    /// Results for every call of one parallel batch, submitted together
    BatchedToolResponses { payloads: Vec<ToolResponsePayload> },
}

impl StreamIntent {
    /// Create a chatbox user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage {
            text: text.into(),
            is_system_generated: false,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            tool_choice: None,
        }
    }

    /// Create a system-generated user message
    pub fn system_user(text: impl Into<String>) -> Self {
        Self::UserMessage {
            text: text.into(),
            is_system_generated: true,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            tool_choice: None,
        }
    }

    /// Create a coordinator message
    pub fn coordinator(text: impl Into<String>) -> Self {
        Self::CoordinatorMessage { text: text.into() }
    }

    /// A live, user-originated chat message; always wins over stale tool
    /// accounting
    pub fn is_chatbox(&self) -> bool {
        matches!(
            self,
            Self::UserMessage {
                is_system_generated: false,
                ..
            }
        )
    }

    /// Whether this intent carries tool responses
    pub fn is_tool_response(&self) -> bool {
        matches!(
            self,
            Self::ToolResponse { .. } | Self::BatchedToolResponses { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chatbox_classification() {
        assert!(StreamIntent::user("hi").is_chatbox());
        assert!(!StreamIntent::system_user("status").is_chatbox());
        assert!(!StreamIntent::coordinator("next phase").is_chatbox());
    }

    #[test]
    fn test_tool_response_classification() {
        let payload = ToolResponsePayload {
            call_id: "call_1".into(),
            output: serde_json::json!({}),
            status: ToolCallStatus::Completed,
        };
        assert!(StreamIntent::ToolResponse { payload: payload.clone() }.is_tool_response());
        assert!(
            StreamIntent::BatchedToolResponses {
                payloads: vec![payload]
            }
            .is_tool_response()
        );
        assert!(!StreamIntent::user("hi").is_tool_response());
    }
}
