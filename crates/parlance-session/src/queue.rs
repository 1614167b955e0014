//! Serializes outbound request intents into a single active stream

use std::collections::{HashSet, VecDeque};

use crate::intent::{StreamIntent, ToolResponsePayload};

/// Queue state: at most one provider stream is ever in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Streaming,
}

/// Bookkeeping for one parallel tool-call batch.
///
/// Populated when the orchestrator announces the full call-id set for a
/// completed response; drained when every member has reported and every
/// UI-gated member has completed.
#[derive(Debug, Default)]
struct BatchState {
    expected_count: usize,
    call_ids_in_batch: HashSet<String>,
    collected: Vec<ToolResponsePayload>,
    pending_ui_call_ids: HashSet<String>,
    batch_info_known: bool,
}

impl BatchState {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn has_activity(&self) -> bool {
        self.batch_info_known
            || !self.collected.is_empty()
            || !self.pending_ui_call_ids.is_empty()
    }

    fn ready_to_release(&self) -> bool {
        self.batch_info_known
            && self.pending_ui_call_ids.is_empty()
            && self
                .call_ids_in_batch
                .iter()
                .all(|id| self.collected.iter().any(|p| p.call_id == *id))
    }
}

/// The sequencing state machine.
///
/// A pure synchronous structure: mutating operations return the next intent
/// to dispatch when (and only when) the call caused an Idle → Streaming
/// transition. The caller owns dispatch; this type owns ordering.
#[derive(Debug)]
pub struct StreamQueue {
    state: QueueState,
    pending: VecDeque<StreamIntent>,
    batch: BatchState,
    first_response_streamed: bool,
    max_depth: usize,
}

impl StreamQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: QueueState::Idle,
            pending: VecDeque::new(),
            batch: BatchState::default(),
            first_response_streamed: false,
            max_depth,
        }
    }

    /// Whether a stream is currently in flight
    pub fn is_streaming(&self) -> bool {
        self.state == QueueState::Streaming
    }

    /// Number of queued intents
    pub fn depth(&self) -> usize {
        self.pending.len()
    }

    /// Whether any response has ever completed on this session
    pub fn first_response_streamed(&self) -> bool {
        self.first_response_streamed
    }

    /// Queue an intent. A chatbox message discards any held or expected
    /// tool-response bookkeeping: a live user message always wins over stale
    /// tool accounting.
    pub fn enqueue(&mut self, intent: StreamIntent) -> Option<StreamIntent> {
        if intent.is_chatbox() && self.batch.has_activity() {
            tracing::debug!("chatbox message discards partial tool-call batch state");
            self.batch.reset();
        }
        if self.pending.len() >= self.max_depth {
            tracing::warn!(
                "intent queue full ({} intents), dropping oldest",
                self.max_depth
            );
            self.pending.pop_front();
        }
        self.pending.push_back(intent);
        self.pump()
    }

    /// The in-flight stream finished normally (or was cancelled, which is
    /// reported as a completion).
    ///
    /// Held early results are re-evaluated: if the completed response
    /// announced no batch, they cannot belong to one and are discarded.
    pub fn stream_completed(&mut self) -> Option<StreamIntent> {
        self.state = QueueState::Idle;
        self.first_response_streamed = true;
        if !self.batch.batch_info_known && !self.batch.collected.is_empty() {
            tracing::warn!(
                count = self.batch.collected.len(),
                "discarding held tool responses with no announced batch"
            );
            self.batch.collected.clear();
        }
        self.pump()
    }

    /// The in-flight stream failed. Batch bookkeeping is preserved so
    /// in-flight tool accounting is not lost mid-batch.
    pub fn stream_failed(&mut self) -> Option<StreamIntent> {
        self.state = QueueState::Idle;
        self.pump()
    }

    /// Announce the full tool-call set of a just-completed response. Held
    /// early results are re-evaluated against it; results that do not belong
    /// are discarded.
    pub fn start_tool_call_batch(
        &mut self,
        expected_count: usize,
        call_ids: Vec<String>,
    ) -> Option<StreamIntent> {
        self.batch.expected_count = expected_count;
        self.batch.call_ids_in_batch = call_ids.into_iter().collect();
        self.batch.batch_info_known = true;

        let BatchState {
            collected,
            call_ids_in_batch,
            ..
        } = &mut self.batch;
        collected.retain(|p| {
            let keep = call_ids_in_batch.contains(&p.call_id);
            if !keep {
                tracing::warn!(call_id = %p.call_id, "held tool response not in batch, discarding");
            }
            keep
        });

        self.release_batch_if_ready();
        self.pump()
    }

    /// A tool result arrived from the tool-execution layer.
    ///
    /// Held uncommitted until the batch set is known. Results that cannot
    /// belong to any batch (nothing in flight, no batch announced) are
    /// stale and dropped.
    pub fn tool_response(&mut self, payload: ToolResponsePayload) -> Option<StreamIntent> {
        if self.batch.batch_info_known {
            if !self.batch.call_ids_in_batch.contains(&payload.call_id) {
                tracing::warn!(
                    call_id = %payload.call_id,
                    "tool response does not belong to the active batch, ignoring"
                );
                return None;
            }
        } else if self.state != QueueState::Streaming {
            tracing::warn!(
                call_id = %payload.call_id,
                "tool response with no batch outstanding, ignoring"
            );
            return None;
        }

        match self
            .batch
            .collected
            .iter_mut()
            .find(|p| p.call_id == payload.call_id)
        {
            Some(existing) => *existing = payload,
            None => self.batch.collected.push(payload),
        }

        self.release_batch_if_ready();
        self.pump()
    }

    /// Exclude a call from release accounting until the user acts
    pub fn mark_ui_tool_pending(&mut self, call_id: impl Into<String>) {
        self.batch.pending_ui_call_ids.insert(call_id.into());
    }

    /// The blocking UI flow for a call resolved; the batch may now release
    pub fn mark_ui_tool_complete(&mut self, call_id: &str) -> Option<StreamIntent> {
        if !self.batch.pending_ui_call_ids.remove(call_id) {
            tracing::debug!(call_id, "ui-complete for a call that was not gated");
        }
        self.release_batch_if_ready();
        self.pump()
    }

    /// Tool responses are expected, partially collected, or already queued
    fn expecting_tool_responses(&self) -> bool {
        self.batch.has_activity() || self.pending.iter().any(|i| i.is_tool_response())
    }

    /// Enqueue the batch as one intent once every member has reported and
    /// every UI-gated member has completed.
    fn release_batch_if_ready(&mut self) {
        if !self.batch.ready_to_release() {
            return;
        }
        let mut payloads: Vec<ToolResponsePayload> = self.batch.collected.drain(..).collect();
        let intent = if self.batch.expected_count == 1 && payloads.len() == 1 {
            StreamIntent::ToolResponse {
                payload: payloads.remove(0),
            }
        } else {
            StreamIntent::BatchedToolResponses { payloads }
        };
        self.batch.reset();
        self.pending.push_back(intent);
    }

    /// Select and dequeue the next intent if the queue is idle.
    ///
    /// Priority: a chatbox message is sent immediately; otherwise, while
    /// tool responses are outstanding only a tool-response intent may go
    /// (processing pauses until one arrives); otherwise FIFO.
    fn pump(&mut self) -> Option<StreamIntent> {
        if self.state != QueueState::Idle {
            return None;
        }

        if let Some(pos) = self.pending.iter().position(|i| i.is_chatbox()) {
            return self.begin_stream_at(pos);
        }

        if self.expecting_tool_responses() {
            if let Some(pos) = self.pending.iter().position(|i| i.is_tool_response()) {
                return self.begin_stream_at(pos);
            }
            return None;
        }

        if self.pending.is_empty() {
            return None;
        }
        self.begin_stream_at(0)
    }

    fn begin_stream_at(&mut self, pos: usize) -> Option<StreamIntent> {
        let intent = self.pending.remove(pos)?;
        self.state = QueueState::Streaming;
        self.batch.reset();
        Some(intent)
    }
}
