//! Error types for parlance-session

use thiserror::Error;

/// A failure surfaced from one stream turn
#[derive(Error, Debug)]
pub enum StreamError {
    /// The provider layer failed before or while opening the stream
    #[error(transparent)]
    Provider(#[from] parlance_ai::Error),

    /// The stream reported a failure mid-flight
    #[error("{0}")]
    Stream(String),
}

impl StreamError {
    /// Translate into the single user-visible, assistant-style message.
    ///
    /// The raw error is never shown; the cause is bucketed into
    /// network / auth / rate-limit / server / generic.
    pub fn user_facing_message(&self) -> String {
        let raw = self.to_string().to_lowercase();

        if raw.contains("401")
            || raw.contains("403")
            || raw.contains("unauthorized")
            || raw.contains("authentication")
            || raw.contains("api key")
        {
            "I couldn't authenticate with the assistant service. Please check the API credentials and try again.".to_string()
        } else if raw.contains("429") || raw.contains("rate limit") || raw.contains("too many requests")
        {
            "The assistant service is handling too many requests right now. Please wait a moment and try again.".to_string()
        } else if raw.contains("500")
            || raw.contains("502")
            || raw.contains("503")
            || raw.contains("504")
            || raw.contains("overloaded")
            || raw.contains("internal server")
        {
            "The assistant service ran into a temporary problem. Please try again in a moment.".to_string()
        } else if raw.contains("connection")
            || raw.contains("network")
            || raw.contains("timeout")
            || raw.contains("timed out")
            || raw.contains("dns")
        {
            "A network problem interrupted the conversation. Please check your connection and try again.".to_string()
        } else {
            "Something unexpected went wrong while talking to the assistant service. Please try again.".to_string()
        }
    }
}
