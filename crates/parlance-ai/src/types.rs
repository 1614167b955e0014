//! Wire types for the responses API

use serde::{Deserialize, Serialize};

/// Role of a conversation input message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One item of request input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// A plain conversation message
    Message { role: Role, content: String },
    /// A tool call replayed from a prior turn (transcript resubmission)
    FunctionCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The result for a previously issued tool call
    FunctionCallOutput {
        call_id: String,
        output: serde_json::Value,
    },
}

impl InputItem {
    /// Create a message input item
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: content.into(),
        }
    }

    /// Create a function call output item
    pub fn function_output(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output,
        }
    }
}

/// One item of streamed response output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    /// Assistant message text (complete, as settled by the provider)
    Message { id: String, text: String },
    /// A tool call the model wants answered before the conversation continues
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used in API calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Tool selection policy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    #[default]
    Auto,
    /// Tool use disabled for this request
    None,
    /// Model must call at least one tool
    Required,
}

/// Token usage reported on response completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input: u32,
    #[serde(default)]
    pub output: u32,
}

/// A streaming request against the responses endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRequest {
    /// Model identifier
    pub model: String,
    /// System instructions for the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Link to the prior response; input items are deltas against it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// New input items for this turn
    pub input: Vec<InputItem>,
    /// Tool schema set for this request
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<ToolDefinition>,
    /// Tool selection policy
    #[serde(default)]
    pub tool_choice: ToolChoice,
    /// Always true for this client
    pub stream: bool,
}

impl ResponseRequest {
    /// Create a request with the given model and input
    pub fn new(model: impl Into<String>, input: Vec<InputItem>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            previous_response_id: None,
            input,
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            stream: true,
        }
    }
}
