//! Turns a queued intent into a provider request and runs it to completion

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::StreamExt;
use parlance_ai::{InputItem, ProviderClient, ResponseRequest, Usage};
use regex::Regex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::events::SessionEvent;
use crate::router::{RouterNotice, StreamRouter};
use crate::tool::recovered_output;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay; attempt N backs off N × base
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Calculate delay before a given attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Matches a provider-issued call id inside an error message
static CALL_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcall_[A-Za-z0-9_-]+").unwrap());

/// Extract the offending call id from a missing-tool-output rejection.
///
/// The provider rejects a request that references a tool call for which no
/// result was ever submitted; the error text names the call.
pub(crate) fn desync_call_id(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if !lower.contains("tool output") {
        return None;
    }
    if !(lower.contains("no ") || lower.contains("missing") || lower.contains("not found")) {
        return None;
    }
    CALL_ID_PATTERN
        .find(message)
        .map(|m| m.as_str().to_string())
}

/// Check if a mid-stream failure message is retryable: server errors,
/// decode failures, timeouts, and transport-level connection problems.
pub(crate) fn is_retryable_message(message: &str) -> bool {
    let m = message.to_lowercase();
    if m.contains("500")
        || m.contains("502")
        || m.contains("503")
        || m.contains("504")
        || m.contains("529")
        || m.contains("internal server")
        || m.contains("overloaded")
    {
        return true;
    }
    if m.contains("timeout") || m.contains("timed out") {
        return true;
    }
    if m.contains("connection") || m.contains("network") || m.contains("dns") {
        return true;
    }
    if m.contains("failed to decode") || m.contains("sse error") {
        return true;
    }
    m.contains("stream ended unexpectedly")
}

/// A finalized assistant message from one response
#[derive(Debug, Clone)]
pub(crate) struct FinalizedMessage {
    pub message_id: String,
    pub text: String,
}

/// A tool call detected on the stream
#[derive(Debug, Clone)]
pub(crate) struct DetectedToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// How a turn ended
#[derive(Debug, Default)]
pub(crate) enum TurnOutcome {
    #[default]
    Completed,
    /// Treated as a normal completion path by the queue
    Cancelled,
    Failed(StreamError),
}

/// Everything a completed turn produced
#[derive(Debug, Default)]
pub(crate) struct TurnResult {
    pub response_id: Option<String>,
    pub messages: Vec<FinalizedMessage>,
    pub tool_calls: Vec<DetectedToolCall>,
    pub usage: Usage,
    pub outcome: TurnOutcome,
}

/// Executes one request intent: open the stream, route events, retry on
/// transient failure, recover from tool-output desyncs, honor cancellation.
pub(crate) struct Orchestrator {
    provider: Arc<dyn ProviderClient>,
    retry: RetryConfig,
}

impl Orchestrator {
    pub(crate) fn new(provider: Arc<dyn ProviderClient>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    pub(crate) async fn execute(
        &self,
        mut request: ResponseRequest,
        cancel: CancellationToken,
        events: &broadcast::Sender<SessionEvent>,
    ) -> TurnResult {
        let mut result = TurnResult::default();
        let mut attempt = 0u32;
        // Call ids already answered synthetically; a repeat rejection for
        // the same id means recovery is not converging
        let mut recovered: HashSet<String> = HashSet::new();

        'attempts: loop {
            if cancel.is_cancelled() {
                result.outcome = TurnOutcome::Cancelled;
                return result;
            }

            let mut stream = match self.provider.stream(&request).await {
                Ok(stream) => stream,
                Err(e) => {
                    if e.is_tool_output_desync() {
                        if let Some(call_id) = desync_call_id(&e.to_string()) {
                            if recovered.insert(call_id.clone()) {
                                tracing::warn!(
                                    %call_id,
                                    "provider reported missing tool output, synthesizing and resubmitting"
                                );
                                request.input.insert(
                                    0,
                                    InputItem::function_output(call_id, recovered_output()),
                                );
                                continue 'attempts;
                            }
                        }
                    }
                    if attempt < self.retry.max_retries && e.is_retryable() {
                        attempt += 1;
                        let delay = self.retry.delay_for_attempt(attempt);
                        tracing::warn!(
                            attempt,
                            max_retries = self.retry.max_retries,
                            error = %e,
                            "request failed, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue 'attempts;
                    }
                    result.outcome = TurnOutcome::Failed(StreamError::Provider(e));
                    return result;
                }
            };

            let mut router = StreamRouter::new();
            result.messages.clear();
            result.tool_calls.clear();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        // Stop consuming; whatever streamed stays visible
                        for notice in router.cancel_pending() {
                            apply_notice(notice, &mut result, events);
                        }
                        result.outcome = TurnOutcome::Cancelled;
                        return result;
                    }
                    event = stream.next() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                for notice in router.handle_event(event) {
                    match notice {
                        RouterNotice::ResponseFailed { message } => {
                            if let Some(call_id) = desync_call_id(&message) {
                                if recovered.insert(call_id.clone()) {
                                    tracing::warn!(
                                        %call_id,
                                        "provider reported missing tool output, synthesizing and resubmitting"
                                    );
                                    request.input.insert(
                                        0,
                                        InputItem::function_output(call_id, recovered_output()),
                                    );
                                    continue 'attempts;
                                }
                            }
                            if attempt < self.retry.max_retries && is_retryable_message(&message) {
                                attempt += 1;
                                let delay = self.retry.delay_for_attempt(attempt);
                                tracing::warn!(
                                    attempt,
                                    max_retries = self.retry.max_retries,
                                    "stream failed ({}), retrying in {:?}",
                                    message,
                                    delay
                                );
                                tokio::time::sleep(delay).await;
                                continue 'attempts;
                            }
                            // Flush partial text so it stays visible
                            for notice in router.cancel_pending() {
                                apply_notice(notice, &mut result, events);
                            }
                            result.outcome = TurnOutcome::Failed(StreamError::Stream(message));
                            return result;
                        }
                        RouterNotice::ResponseCompleted { response_id, usage } => {
                            result.response_id = Some(response_id);
                            result.usage = usage;
                        }
                        other => apply_notice(other, &mut result, events),
                    }
                }
            }

            if result.response_id.is_some() {
                result.outcome = TurnOutcome::Completed;
                return result;
            }

            // The stream ended without a terminal event: the transport
            // dropped mid-flight
            if attempt < self.retry.max_retries {
                attempt += 1;
                let delay = self.retry.delay_for_attempt(attempt);
                tracing::warn!(attempt, "stream ended unexpectedly, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                continue 'attempts;
            }
            result.outcome =
                TurnOutcome::Failed(StreamError::Stream("stream ended unexpectedly".into()));
            return result;
        }
    }
}

fn apply_notice(
    notice: RouterNotice,
    result: &mut TurnResult,
    events: &broadcast::Sender<SessionEvent>,
) {
    match notice {
        RouterNotice::MessageBegan { message_id } => {
            let _ = events.send(SessionEvent::MessageBegan { message_id });
        }
        RouterNotice::MessageUpdated { message_id, delta } => {
            let _ = events.send(SessionEvent::MessageUpdated { message_id, delta });
        }
        RouterNotice::MessageFinalized { message_id, text } => {
            let _ = events.send(SessionEvent::MessageFinalized {
                message_id: message_id.clone(),
                text: text.clone(),
            });
            result.messages.push(FinalizedMessage { message_id, text });
        }
        RouterNotice::ToolCallDetected {
            call_id,
            name,
            arguments,
        } => {
            let _ = events.send(SessionEvent::ToolCallRequested {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            });
            result.tool_calls.push(DetectedToolCall {
                call_id,
                name,
                arguments,
            });
        }
        // Terminal notices are handled by the caller
        RouterNotice::ResponseCompleted { .. } | RouterNotice::ResponseFailed { .. } => {}
    }
}
