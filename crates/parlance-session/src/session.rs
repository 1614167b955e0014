//! Session: the conversation facade

use std::sync::{Arc, atomic::Ordering};

use parking_lot::Mutex;
use parlance_ai::{
    InputItem, ProviderClient, ResponseRequest, Role, ToolChoice, ToolDefinition, Usage,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::entry::{ConversationEntry, ToolCallSlot, ToolCallStatus};
use crate::events::{SessionEvent, StreamStatus};
use crate::handle::SessionHandle;
use crate::intent::{StreamIntent, ToolResponsePayload};
use crate::log::ConversationLog;
use crate::orchestrator::{Orchestrator, RetryConfig, TurnOutcome, TurnResult};
use crate::queue::StreamQueue;
use crate::tool::ToolExecutor;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier sent on every request
    pub model: String,
    /// System instructions
    pub instructions: Option<String>,
    /// Tool schema set advertised to the model
    pub tools: Vec<ToolDefinition>,
    /// Retry policy for provider requests
    pub retry: RetryConfig,
    /// Maximum queued intents before the oldest is dropped
    pub max_queue_depth: usize,
}

impl SessionConfig {
    /// Create a configuration with defaults for everything but the model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            tools: vec![],
            retry: RetryConfig::default(),
            max_queue_depth: 100,
        }
    }
}

/// One logical conversation with the provider.
///
/// Multiple producers (UI actions, tool completions, background workflow
/// triggers) may call in concurrently; every mutation funnels through the
/// queue, which admits one provider stream at a time. All send methods are
/// fire-and-forget. Cloning is cheap and shares the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    tools: Arc<dyn ToolExecutor>,
    log: AsyncMutex<ConversationLog>,
    queue: Mutex<StreamQueue>,
    orchestrator: Orchestrator,
    event_tx: broadcast::Sender<SessionEvent>,
    handle: SessionHandle,
    last_response_id: Mutex<Option<String>>,
    total_usage: Mutex<Usage>,
}

impl Session {
    /// Create a new session
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn ProviderClient>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let max_queue_depth = config.max_queue_depth;
        let retry = config.retry.clone();
        Self {
            inner: Arc::new(SessionInner {
                config,
                tools,
                log: AsyncMutex::new(ConversationLog::new()),
                queue: Mutex::new(StreamQueue::new(max_queue_depth)),
                orchestrator: Orchestrator::new(provider, retry),
                event_tx,
                handle: SessionHandle::new(),
                last_response_id: Mutex::new(None),
                total_usage: Mutex::new(Usage::default()),
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Get a cloneable handle (cancel, idle waits)
    pub fn handle(&self) -> SessionHandle {
        self.inner.handle.clone()
    }

    /// Queue a chatbox message typed by the user. Sent ahead of everything
    /// else; discards stale tool-response expectations.
    pub fn send_user_message(&self, text: impl Into<String>) {
        self.enqueue(StreamIntent::user(text));
    }

    /// Queue a system-generated user-visible message
    pub fn send_system_message(&self, text: impl Into<String>) {
        self.enqueue(StreamIntent::system_user(text));
    }

    /// Queue a coordinator message from the surrounding application
    pub fn send_coordinator_message(&self, text: impl Into<String>) {
        self.enqueue(StreamIntent::coordinator(text));
    }

    /// Report a tool result. Fills the matching log slot immediately; the
    /// result is submitted to the provider once its batch is complete.
    pub async fn submit_tool_result(
        &self,
        call_id: impl Into<String>,
        output: serde_json::Value,
        status: ToolCallStatus,
    ) {
        let call_id = call_id.into();
        self.inner
            .log
            .lock()
            .await
            .set_tool_result(&call_id, output.clone(), status);
        let dispatch = self.inner.queue.lock().tool_response(ToolResponsePayload {
            call_id,
            output,
            status,
        });
        if let Some(intent) = dispatch {
            SessionInner::spawn_stream(&self.inner, intent);
        }
    }

    /// Exclude a tool call from batch release until the user acts
    pub fn mark_ui_tool_pending(&self, call_id: impl Into<String>) {
        self.inner.queue.lock().mark_ui_tool_pending(call_id);
    }

    /// The blocking UI flow for a tool call resolved
    pub fn mark_ui_tool_complete(&self, call_id: &str) {
        let dispatch = self.inner.queue.lock().mark_ui_tool_complete(call_id);
        if let Some(intent) = dispatch {
            SessionInner::spawn_stream(&self.inner, intent);
        }
    }

    /// Cancel the in-flight stream. Partial assistant text is finalized and
    /// stays visible; the queue proceeds as if the stream completed.
    pub fn cancel_active_stream(&self) {
        self.inner.handle.abort();
    }

    /// Replace the conversation wholesale (persisted-session resume).
    /// Unresolved slots in the restored log are healed on the next user
    /// append, not here.
    pub async fn restore(&self, entries: Vec<ConversationEntry>) {
        self.inner.log.lock().await.restore(entries);
        *self.inner.last_response_id.lock() = None;
    }

    /// Snapshot of the conversation log
    pub async fn entries(&self) -> Vec<ConversationEntry> {
        self.inner.log.lock().await.entries().to_vec()
    }

    /// Whether a provider stream is in flight
    pub fn is_streaming(&self) -> bool {
        self.inner.queue.lock().is_streaming()
    }

    /// Number of queued intents
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().depth()
    }

    /// Cumulative token usage across all turns
    pub fn total_usage(&self) -> Usage {
        self.inner.total_usage.lock().clone()
    }

    /// Wait until no stream is in flight
    pub async fn wait_for_idle(&self) {
        self.inner.handle.wait_for_idle().await;
    }

    fn enqueue(&self, intent: StreamIntent) {
        let (dispatch, depth) = {
            let mut queue = self.inner.queue.lock();
            (queue.enqueue(intent), queue.depth())
        };
        let _ = self.inner.event_tx.send(SessionEvent::QueueDepth { depth });
        if let Some(intent) = dispatch {
            SessionInner::spawn_stream(&self.inner, intent);
        }
    }
}

impl SessionInner {
    /// Launch the stream task for a dispatched intent. The queue has already
    /// transitioned to Streaming, so at most one task is ever live.
    fn spawn_stream(inner: &Arc<SessionInner>, intent: StreamIntent) {
        inner.handle.is_streaming.store(true, Ordering::Release);
        let cancel = inner.handle.reset_cancel();
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            inner.run_stream(intent, cancel).await;
        });
    }

    async fn run_stream(self: Arc<Self>, intent: StreamIntent, cancel: CancellationToken) {
        let _ = self.event_tx.send(SessionEvent::StreamStatus {
            status: StreamStatus::Busy,
        });

        // Record the outbound turn. User appends heal any unresolved slots
        // left by a preempted batch before the entry lands.
        match &intent {
            StreamIntent::UserMessage {
                text,
                is_system_generated,
                ..
            } => {
                self.log
                    .lock()
                    .await
                    .append_user(text.clone(), *is_system_generated, self.tools.as_ref())
                    .await;
            }
            StreamIntent::CoordinatorMessage { text } => {
                self.log
                    .lock()
                    .await
                    .append_user(text.clone(), true, self.tools.as_ref())
                    .await;
            }
            // Tool results were already recorded when they were submitted
            StreamIntent::ToolResponse { .. } | StreamIntent::BatchedToolResponses { .. } => {}
        }

        let request = self.build_request(&intent).await;
        let result = self.orchestrator.execute(request, cancel, &self.event_tx).await;
        Self::finish_stream(&self, result).await;
    }

    async fn build_request(&self, intent: &StreamIntent) -> ResponseRequest {
        let previous_response_id = self.last_response_id.lock().clone();

        let input = match &previous_response_id {
            Some(_) => match intent {
                StreamIntent::UserMessage { text, .. } => {
                    vec![InputItem::message(Role::User, text.clone())]
                }
                StreamIntent::CoordinatorMessage { text } => {
                    vec![InputItem::message(Role::User, text.clone())]
                }
                StreamIntent::ToolResponse { payload } => {
                    vec![InputItem::function_output(
                        payload.call_id.clone(),
                        payload.output.clone(),
                    )]
                }
                StreamIntent::BatchedToolResponses { payloads } => payloads
                    .iter()
                    .map(|p| InputItem::function_output(p.call_id.clone(), p.output.clone()))
                    .collect(),
            },
            // Nothing to link to (fresh or restored session): replay the
            // full transcript
            None => self.log.lock().await.to_request_input(),
        };

        let tool_choice = self.tool_choice_for(intent).await;

        ResponseRequest {
            model: self.config.model.clone(),
            instructions: self.config.instructions.clone(),
            previous_response_id,
            input,
            tools: self.config.tools.clone(),
            tool_choice,
            stream: true,
        }
    }

    /// The very first user turn of a session is sent with tool use disabled,
    /// forcing an unconditional opening response. Everything else uses
    /// automatic selection.
    async fn tool_choice_for(&self, intent: &StreamIntent) -> ToolChoice {
        match intent {
            StreamIntent::UserMessage {
                tool_choice: Some(choice),
                ..
            } => *choice,
            StreamIntent::UserMessage {
                is_system_generated: false,
                ..
            } => {
                if self.queue.lock().first_response_streamed() {
                    return ToolChoice::Auto;
                }
                if self.log.lock().await.has_assistant_entry() {
                    ToolChoice::Auto
                } else {
                    ToolChoice::None
                }
            }
            _ => ToolChoice::Auto,
        }
    }

    async fn finish_stream(inner: &Arc<Self>, result: TurnResult) {
        match &result.outcome {
            TurnOutcome::Completed | TurnOutcome::Cancelled => {
                let cancelled = matches!(result.outcome, TurnOutcome::Cancelled);
                inner.append_assistant_entry(&result).await;

                if let Some(response_id) = &result.response_id {
                    *inner.last_response_id.lock() = Some(response_id.clone());
                }
                {
                    let mut usage = inner.total_usage.lock();
                    usage.input += result.usage.input;
                    usage.output += result.usage.output;
                }

                let dispatch = {
                    let mut queue = inner.queue.lock();
                    if !cancelled && !result.tool_calls.is_empty() {
                        // The batch must be registered before the queue
                        // resumes, or a queued system message could race
                        // ahead of the outstanding results
                        let ids: Vec<String> = result
                            .tool_calls
                            .iter()
                            .map(|c| c.call_id.clone())
                            .collect();
                        let _ = queue.start_tool_call_batch(ids.len(), ids);
                    }
                    queue.stream_completed()
                };
                Self::resume(inner, dispatch, StreamStatus::Idle);
            }
            TurnOutcome::Failed(error) => {
                // Keep whatever partial text streamed, then surface a single
                // user-visible message in place of the raw error
                inner.append_assistant_entry(&result).await;
                let notice = error.user_facing_message();
                tracing::warn!(%error, "stream failed");
                inner.log.lock().await.append_assistant(
                    uuid::Uuid::new_v4().to_string(),
                    notice.clone(),
                    vec![],
                );
                let _ = inner.event_tx.send(SessionEvent::ErrorNotice { message: notice });

                let dispatch = inner.queue.lock().stream_failed();
                Self::resume(inner, dispatch, StreamStatus::Error);
            }
        }
    }

    async fn append_assistant_entry(&self, result: &TurnResult) {
        let text = result
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let slots: Vec<ToolCallSlot> = result
            .tool_calls
            .iter()
            .map(|c| ToolCallSlot::pending(c.call_id.clone(), c.name.clone(), c.arguments.clone()))
            .collect();
        if text.is_empty() && slots.is_empty() {
            return;
        }
        let id = result
            .messages
            .first()
            .map(|m| m.message_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.log.lock().await.append_assistant(id, text, slots);
    }

    fn resume(inner: &Arc<Self>, dispatch: Option<StreamIntent>, end_status: StreamStatus) {
        let _ = inner.event_tx.send(SessionEvent::StreamStatus { status: end_status });
        match dispatch {
            Some(intent) => Self::spawn_stream(inner, intent),
            None => {
                let went_idle = {
                    let queue = inner.queue.lock();
                    if queue.is_streaming() {
                        // Another producer dispatched between our queue call
                        // and now; they own the streaming flag
                        false
                    } else {
                        inner.handle.is_streaming.store(false, Ordering::Release);
                        true
                    }
                };
                if went_idle {
                    inner.handle.idle_notify.notify_waiters();
                }
            }
        }
    }
}
