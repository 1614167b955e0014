//! Tool-execution collaborator boundary

use async_trait::async_trait;

/// The tool-execution layer, as seen from the conversation core.
///
/// Implementations run tools detected on the stream and report back through
/// [`crate::Session::submit_tool_result`]; the core only ever calls in the
/// other direction to cancel work or to check whether a call finished
/// concurrently with an interruption.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Request cancellation of a running tool call.
    async fn cancel(&self, call_id: &str, reason: &str);

    /// Fetch the result for a call if it has in fact completed.
    async fn get_result(&self, call_id: &str) -> Option<serde_json::Value>;
}

/// Synthetic output for a slot resolved by interruption
pub fn cancelled_output(reason: &str) -> serde_json::Value {
    serde_json::json!({
        "status": "cancelled",
        "reason": reason,
    })
}

/// Synthetic output submitted when the provider reports a missing tool result
pub fn recovered_output() -> serde_json::Value {
    serde_json::json!({
        "status": "incomplete",
        "reason": "Recovered without tool output",
    })
}
