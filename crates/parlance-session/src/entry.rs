//! Conversation entries and tool-call slots

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tool-call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Issued by the model, result not yet available
    Pending,
    /// Result delivered by the tool layer
    Completed,
    /// Cancelled before a result was produced
    Cancelled,
    /// Tool execution failed
    Failed,
}

/// One tool call issued by the model, with its asynchronously filled result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSlot {
    /// Provider-issued call id, unique per call
    pub call_id: String,
    /// Tool name
    pub name: String,
    /// Arguments as issued by the model
    pub arguments: serde_json::Value,
    /// Result payload, filled when the tool layer reports back
    pub result: Option<serde_json::Value>,
    /// Slot status
    pub status: ToolCallStatus,
}

impl ToolCallSlot {
    /// Create a fresh, unresolved slot
    pub fn pending(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
            result: None,
            status: ToolCallStatus::Pending,
        }
    }

    /// A slot is resolved exactly when it carries a result
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

/// An entry in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationEntry {
    /// A user-visible inbound turn (typed by the user or injected by the
    /// surrounding application)
    User {
        id: String,
        text: String,
        is_system_generated: bool,
        timestamp: i64,
    },
    /// An assistant turn; tool-call slots start empty and are filled
    /// asynchronously
    Assistant {
        id: String,
        text: String,
        tool_calls: Vec<ToolCallSlot>,
        timestamp: i64,
    },
}

impl ConversationEntry {
    /// Create a user entry
    pub fn user(text: impl Into<String>, is_system_generated: bool) -> Self {
        Self::User {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            is_system_generated,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an assistant entry with the given slots
    pub fn assistant(
        id: impl Into<String>,
        text: impl Into<String>,
        tool_calls: Vec<ToolCallSlot>,
    ) -> Self {
        Self::Assistant {
            id: id.into(),
            text: text.into(),
            tool_calls,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Entry id
    pub fn id(&self) -> &str {
        match self {
            Self::User { id, .. } => id,
            Self::Assistant { id, .. } => id,
        }
    }

    /// Tool-call slots, if any
    pub fn tool_calls(&self) -> &[ToolCallSlot] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            Self::User { .. } => &[],
        }
    }

    /// Call ids of unresolved slots
    pub fn unresolved_call_ids(&self) -> Vec<String> {
        self.tool_calls()
            .iter()
            .filter(|s| !s.is_resolved())
            .map(|s| s.call_id.clone())
            .collect()
    }

    /// Whether any slot is unresolved
    pub fn has_unresolved(&self) -> bool {
        self.tool_calls().iter().any(|s| !s.is_resolved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_resolution() {
        let mut slot = ToolCallSlot::pending("call_1", "lookup", serde_json::json!({}));
        assert!(!slot.is_resolved());
        assert_eq!(slot.status, ToolCallStatus::Pending);

        slot.result = Some(serde_json::json!({"answer": 42}));
        slot.status = ToolCallStatus::Completed;
        assert!(slot.is_resolved());
    }

    #[test]
    fn test_unresolved_call_ids() {
        let mut resolved = ToolCallSlot::pending("call_a", "a", serde_json::json!({}));
        resolved.result = Some(serde_json::json!(null));
        resolved.status = ToolCallStatus::Completed;
        let open = ToolCallSlot::pending("call_b", "b", serde_json::json!({}));

        let entry = ConversationEntry::assistant("m1", "", vec![resolved, open]);
        assert_eq!(entry.unresolved_call_ids(), vec!["call_b".to_string()]);
        assert!(entry.has_unresolved());
    }

    #[test]
    fn test_user_entry_has_no_slots() {
        let entry = ConversationEntry::user("hello", false);
        assert!(entry.tool_calls().is_empty());
        assert!(!entry.has_unresolved());
    }

    #[test]
    fn test_entry_serialization_role_tag() {
        let entry = ConversationEntry::user("hi", true);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["is_system_generated"], true);
    }
}
