//! SSE client for the responses endpoint

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::{
    error::{Error, Result},
    events::{ProviderEvent, ProviderEventStream},
    types::ResponseRequest,
};

/// A client able to open one streaming response at a time
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit a request and stream the response events
    async fn stream(&self, request: &ResponseRequest) -> Result<ProviderEventStream>;
}

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client for the streaming responses API
pub struct ResponsesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResponsesClient {
    /// Create a new client with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from the `PARLANCE_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PARLANCE_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for ResponsesClient {
    async fn stream(&self, request: &ResponseRequest) -> Result<ProviderEventStream> {
        let url = format!("{}/responses", self.base_url);
        tracing::debug!(
            model = %request.model,
            input_items = request.input.len(),
            linked = request.previous_response_id.is_some(),
            "opening response stream"
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", self.api_key)
                .parse()
                .map_err(|_| Error::Auth("API key is not a valid header value".to_string()))?,
        );
        headers.insert("content-type", "application/json".parse().unwrap());

        let request_builder = self.client.post(&url).headers(headers).json(request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = ProviderEvent> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<ProviderEvent>(&msg.data) {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield event;
                            if terminal {
                                break;
                            }
                        }
                        Err(e) => {
                            yield ProviderEvent::Failed {
                                message: format!("Failed to decode event: {}", e),
                            };
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(code, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield ProviderEvent::Failed {
                        message: format!("HTTP {}: {}", code.as_u16(), body),
                    };
                    break;
                }
                Err(e) => {
                    yield ProviderEvent::Failed {
                        message: format!("SSE error: {}", e),
                    };
                    break;
                }
            }
        }
    }
}
