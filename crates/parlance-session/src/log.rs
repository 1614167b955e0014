//! Conversation log: the single source of truth for conversation history

use parlance_ai::{InputItem, Role};

use crate::entry::{ConversationEntry, ToolCallSlot, ToolCallStatus};
use crate::tool::{ToolExecutor, cancelled_output};

/// Append-only conversation history.
///
/// Invariant: at most the last entry may carry an unresolved tool-call slot.
/// `append_user` heals any unresolved slots before appending, so the log is
/// always a transcript the provider will accept on the next request.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Append an assistant entry; each tool call becomes a pending slot
    pub fn append_assistant(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        tool_calls: Vec<ToolCallSlot>,
    ) {
        self.entries
            .push(ConversationEntry::assistant(id, text, tool_calls));
    }

    /// Fill the slot for `call_id` in the last entry.
    ///
    /// Slots are only ever open on the most recent entry, so only the last
    /// entry is searched. An unknown call id is a recoverable desync: logged,
    /// no state change. A slot that already holds a result is left alone.
    pub fn set_tool_result(
        &mut self,
        call_id: &str,
        output: serde_json::Value,
        status: ToolCallStatus,
    ) {
        let Some(ConversationEntry::Assistant { tool_calls, .. }) = self.entries.last_mut() else {
            tracing::warn!(call_id, "tool result arrived but the last entry has no slots");
            return;
        };
        match tool_calls.iter_mut().find(|s| s.call_id == call_id) {
            Some(slot) if !slot.is_resolved() => {
                slot.result = Some(output);
                slot.status = status;
            }
            Some(_) => {
                tracing::warn!(call_id, "slot already resolved, ignoring late result");
            }
            None => {
                tracing::warn!(call_id, "no slot for tool result in the last entry");
            }
        }
    }

    /// Append a user entry, healing any unresolved slots in the last entry
    /// first.
    ///
    /// For each unresolved call: cancellation is requested from the tool
    /// layer, then the slot is filled with the real result if the call had
    /// in fact completed concurrently, or with a synthetic cancelled payload
    /// otherwise. Only then is the new entry appended. Returns the new
    /// entry's id.
    pub async fn append_user(
        &mut self,
        text: impl Into<String>,
        is_system_generated: bool,
        tools: &dyn ToolExecutor,
    ) -> String {
        let pending = self.pending_tool_call_ids();
        if !pending.is_empty() {
            tracing::info!(
                count = pending.len(),
                "healing unresolved tool calls before user append"
            );
            for call_id in pending {
                tools.cancel(&call_id, "User interrupted").await;
                let (output, status) = match tools.get_result(&call_id).await {
                    Some(output) => (output, ToolCallStatus::Completed),
                    None => (
                        cancelled_output("User interrupted"),
                        ToolCallStatus::Cancelled,
                    ),
                };
                self.set_tool_result(&call_id, output, status);
            }
        }

        let entry = ConversationEntry::user(text, is_system_generated);
        let id = entry.id().to_string();
        self.entries.push(entry);
        id
    }

    /// Replace the log wholesale (persisted-session resume).
    ///
    /// A restored log ending with unresolved slots is left as-is; healing is
    /// deferred to the next `append_user` call.
    pub fn restore(&mut self, entries: Vec<ConversationEntry>) {
        if entries.last().is_some_and(|e| e.has_unresolved()) {
            tracing::info!("restored log ends with unresolved tool calls; healing deferred");
        }
        self.entries = entries;
    }

    /// Whether the last entry has unresolved slots
    pub fn has_pending_tool_calls(&self) -> bool {
        self.entries.last().is_some_and(|e| e.has_unresolved())
    }

    /// Call ids of unresolved slots in the last entry
    pub fn pending_tool_call_ids(&self) -> Vec<String> {
        self.entries
            .last()
            .map(|e| e.unresolved_call_ids())
            .unwrap_or_default()
    }

    /// Whether any assistant entry exists (the session has seen a response)
    pub fn has_assistant_entry(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, ConversationEntry::Assistant { .. }))
    }

    /// Render the log as provider input for full-transcript replay
    pub fn to_request_input(&self) -> Vec<InputItem> {
        let mut items = vec![];
        for entry in &self.entries {
            match entry {
                ConversationEntry::User { text, .. } => {
                    items.push(InputItem::message(Role::User, text.clone()));
                }
                ConversationEntry::Assistant {
                    text, tool_calls, ..
                } => {
                    if !text.is_empty() {
                        items.push(InputItem::message(Role::Assistant, text.clone()));
                    }
                    for slot in tool_calls {
                        items.push(InputItem::FunctionCall {
                            call_id: slot.call_id.clone(),
                            name: slot.name.clone(),
                            arguments: slot.arguments.clone(),
                        });
                        if let Some(result) = &slot.result {
                            items.push(InputItem::function_output(
                                slot.call_id.clone(),
                                result.clone(),
                            ));
                        }
                    }
                }
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Records cancellations and serves scripted results.
    struct ScriptedExecutor {
        results: HashMap<String, serde_json::Value>,
        cancelled: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(results: Vec<(&str, serde_json::Value)>) -> Self {
            Self {
                results: results
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                cancelled: Mutex::new(vec![]),
            }
        }

        fn empty() -> Self {
            Self::new(vec![])
        }
    }

    #[async_trait]
    impl ToolExecutor for ScriptedExecutor {
        async fn cancel(&self, call_id: &str, _reason: &str) {
            self.cancelled.lock().push(call_id.to_string());
        }

        async fn get_result(&self, call_id: &str) -> Option<serde_json::Value> {
            self.results.get(call_id).cloned()
        }
    }

    fn log_with_pending_calls(call_ids: &[&str]) -> ConversationLog {
        let mut log = ConversationLog::new();
        let slots = call_ids
            .iter()
            .map(|id| ToolCallSlot::pending(*id, "lookup", serde_json::json!({})))
            .collect();
        log.append_assistant("m1", "working on it", slots);
        log
    }

    #[test]
    fn test_set_tool_result_fills_last_entry_slot() {
        let mut log = log_with_pending_calls(&["call_a"]);
        log.set_tool_result("call_a", serde_json::json!({"ok": true}), ToolCallStatus::Completed);

        let slot = &log.entries().last().unwrap().tool_calls()[0];
        assert!(slot.is_resolved());
        assert_eq!(slot.status, ToolCallStatus::Completed);
        assert!(!log.has_pending_tool_calls());
    }

    #[test]
    fn test_set_tool_result_unknown_id_is_noop() {
        let mut log = log_with_pending_calls(&["call_a"]);
        log.set_tool_result("call_zzz", serde_json::json!({}), ToolCallStatus::Completed);
        assert!(log.has_pending_tool_calls());
    }

    #[test]
    fn test_set_tool_result_only_searches_last_entry() {
        // An unresolved slot buried in the middle of a restored log must not
        // be touched.
        let mut log = ConversationLog::new();
        log.restore(vec![
            ConversationEntry::assistant(
                "m1",
                "",
                vec![ToolCallSlot::pending("call_old", "lookup", serde_json::json!({}))],
            ),
            ConversationEntry::user("next", false),
        ]);
        log.set_tool_result("call_old", serde_json::json!({}), ToolCallStatus::Completed);
        assert!(!log.entries()[0].tool_calls()[0].is_resolved());
    }

    #[test]
    fn test_set_tool_result_does_not_overwrite() {
        let mut log = log_with_pending_calls(&["call_a"]);
        log.set_tool_result("call_a", serde_json::json!("first"), ToolCallStatus::Completed);
        log.set_tool_result("call_a", serde_json::json!("second"), ToolCallStatus::Failed);

        let slot = &log.entries().last().unwrap().tool_calls()[0];
        assert_eq!(slot.result, Some(serde_json::json!("first")));
        assert_eq!(slot.status, ToolCallStatus::Completed);
    }

    #[tokio::test]
    async fn test_append_user_heals_unresolved_slots() {
        // Slot A completed concurrently (executor has its result), slot B
        // did not: A gets the real value, B the synthetic cancelled payload.
        let mut log = log_with_pending_calls(&["call_a", "call_b"]);
        let tools = ScriptedExecutor::new(vec![("call_a", serde_json::json!({"answer": 42}))]);

        log.append_user("actually, stop", false, &tools).await;

        let entries = log.entries();
        assert_eq!(entries.len(), 2);

        let slots = entries[0].tool_calls();
        assert_eq!(slots[0].result, Some(serde_json::json!({"answer": 42})));
        assert_eq!(slots[0].status, ToolCallStatus::Completed);
        assert_eq!(slots[1].status, ToolCallStatus::Cancelled);
        assert_eq!(slots[1].result.as_ref().unwrap()["reason"], "User interrupted");

        // Cancellation was requested for both before filling
        let cancelled = tools.cancelled.lock().clone();
        assert_eq!(cancelled, vec!["call_a".to_string(), "call_b".to_string()]);

        assert!(matches!(entries[1], ConversationEntry::User { .. }));
        assert!(!log.has_pending_tool_calls());
    }

    #[tokio::test]
    async fn test_append_user_without_pending_slots_skips_healing() {
        let mut log = ConversationLog::new();
        let tools = ScriptedExecutor::empty();
        log.append_user("hello", false, &tools).await;

        assert_eq!(log.entries().len(), 1);
        assert!(tools.cancelled.lock().is_empty());
    }

    #[tokio::test]
    async fn test_restore_defers_healing_to_next_append() {
        let mut log = ConversationLog::new();
        log.restore(vec![ConversationEntry::assistant(
            "m1",
            "checking",
            vec![ToolCallSlot::pending("call_a", "lookup", serde_json::json!({}))],
        )]);

        // Restore itself does not mutate
        assert!(log.has_pending_tool_calls());

        let tools = ScriptedExecutor::empty();
        log.append_user("resume", false, &tools).await;

        assert!(!log.has_pending_tool_calls());
        assert_eq!(
            log.entries()[0].tool_calls()[0].status,
            ToolCallStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_invariant_only_last_entry_unresolved() {
        let mut log = ConversationLog::new();
        let tools = ScriptedExecutor::empty();

        log.append_user("q1", false, &tools).await;
        log.append_assistant(
            "m1",
            "",
            vec![ToolCallSlot::pending("call_1", "a", serde_json::json!({}))],
        );
        log.set_tool_result("call_1", serde_json::json!({}), ToolCallStatus::Completed);
        log.append_user("q2", false, &tools).await;
        log.append_assistant(
            "m2",
            "",
            vec![ToolCallSlot::pending("call_2", "b", serde_json::json!({}))],
        );

        for entry in &log.entries()[..log.entries().len() - 1] {
            assert!(!entry.has_unresolved());
        }
    }

    #[test]
    fn test_to_request_input_replays_transcript() {
        let mut log = ConversationLog::new();
        log.restore(vec![
            ConversationEntry::user("question", false),
            ConversationEntry::assistant(
                "m1",
                "let me check",
                vec![ToolCallSlot {
                    call_id: "call_1".into(),
                    name: "lookup".into(),
                    arguments: serde_json::json!({"q": "x"}),
                    result: Some(serde_json::json!({"found": true})),
                    status: ToolCallStatus::Completed,
                }],
            ),
        ]);

        let input = log.to_request_input();
        assert_eq!(input.len(), 4);
        assert!(matches!(&input[0], InputItem::Message { role: Role::User, .. }));
        assert!(matches!(&input[1], InputItem::Message { role: Role::Assistant, .. }));
        assert!(matches!(&input[2], InputItem::FunctionCall { call_id, .. } if call_id == "call_1"));
        assert!(
            matches!(&input[3], InputItem::FunctionCallOutput { call_id, .. } if call_id == "call_1")
        );
    }
}
