//! Routes raw provider events into message-lifecycle notifications

use parlance_ai::{OutputItem, ProviderEvent, Usage};

/// Placeholder text for a cancelled message that never received a delta
const CANCELLED_PLACEHOLDER: &str = "(cancelled)";

/// Notifications produced while consuming one provider response
#[derive(Debug, Clone)]
pub enum RouterNotice {
    /// A new assistant message started
    MessageBegan { message_id: String },
    /// Incremental text for an open message
    MessageUpdated { message_id: String, delta: String },
    /// Message text is now immutable
    MessageFinalized { message_id: String, text: String },
    /// The model issued a tool call
    ToolCallDetected {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The response finished; every open message was finalized first
    ResponseCompleted { response_id: String, usage: Usage },
    /// The response failed mid-stream
    ResponseFailed { message: String },
}

/// Accumulates text for one in-flight assistant message
#[derive(Debug)]
struct StreamBuffer {
    message_id: String,
    accumulated_text: String,
    #[allow(dead_code)]
    started_at: i64,
}

impl StreamBuffer {
    fn new() -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            accumulated_text: String::new(),
            started_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Consumes the provider's event stream for one response, maintaining one
/// buffer per concurrently emitting output item.
#[derive(Debug, Default)]
pub struct StreamRouter {
    /// Open buffers keyed by provider item id, in arrival order
    buffers: Vec<(String, StreamBuffer)>,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any buffer is still open
    pub fn has_pending(&self) -> bool {
        !self.buffers.is_empty()
    }

    /// Consume one provider event, producing zero or more notifications
    pub fn handle_event(&mut self, event: ProviderEvent) -> Vec<RouterNotice> {
        match event {
            ProviderEvent::Created { .. } => vec![],
            ProviderEvent::OutputTextDelta { item_id, delta } => {
                let mut notices = vec![];
                let idx = match self.buffers.iter().position(|(id, _)| *id == item_id) {
                    Some(idx) => idx,
                    None => {
                        let buffer = StreamBuffer::new();
                        notices.push(RouterNotice::MessageBegan {
                            message_id: buffer.message_id.clone(),
                        });
                        self.buffers.push((item_id, buffer));
                        self.buffers.len() - 1
                    }
                };
                let buffer = &mut self.buffers[idx].1;
                buffer.accumulated_text.push_str(&delta);
                notices.push(RouterNotice::MessageUpdated {
                    message_id: buffer.message_id.clone(),
                    delta,
                });
                notices
            }
            ProviderEvent::OutputItemDone { item } => match item {
                OutputItem::Message { id, text } => {
                    // The provider's settled text is authoritative
                    match self.buffers.iter().position(|(bid, _)| *bid == id) {
                        Some(pos) => {
                            let (_, buffer) = self.buffers.remove(pos);
                            vec![RouterNotice::MessageFinalized {
                                message_id: buffer.message_id,
                                text,
                            }]
                        }
                        None => {
                            // Item settled without any delta
                            let buffer = StreamBuffer::new();
                            vec![
                                RouterNotice::MessageBegan {
                                    message_id: buffer.message_id.clone(),
                                },
                                RouterNotice::MessageFinalized {
                                    message_id: buffer.message_id,
                                    text,
                                },
                            ]
                        }
                    }
                }
                // Tool calls are structurally distinct output items, not
                // text; forward immediately so the tool layer can start
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => vec![RouterNotice::ToolCallDetected {
                    call_id,
                    name,
                    arguments,
                }],
            },
            ProviderEvent::Completed { response_id, usage } => {
                let mut notices = self.finalize_all(None);
                notices.push(RouterNotice::ResponseCompleted { response_id, usage });
                notices
            }
            ProviderEvent::Failed { message } => {
                vec![RouterNotice::ResponseFailed { message }]
            }
        }
    }

    /// Force-finalize every open buffer using its accumulated text, or a
    /// placeholder if nothing streamed yet. No-op when nothing is pending.
    pub fn cancel_pending(&mut self) -> Vec<RouterNotice> {
        self.finalize_all(Some(CANCELLED_PLACEHOLDER))
    }

    fn finalize_all(&mut self, empty_placeholder: Option<&str>) -> Vec<RouterNotice> {
        self.buffers
            .drain(..)
            .map(|(_, buffer)| {
                let text = if buffer.accumulated_text.is_empty() {
                    empty_placeholder.unwrap_or_default().to_string()
                } else {
                    buffer.accumulated_text
                };
                RouterNotice::MessageFinalized {
                    message_id: buffer.message_id,
                    text,
                }
            })
            .collect()
    }
}
