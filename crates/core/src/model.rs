//! The ModelClient trait: the abstraction over language-model transports.
//!
//! A client knows how to send a request (transcript, system prompt, tool
//! catalogue) to a model and get a response back, either complete or as a
//! stream of events. Wire formats, retries and authentication all live in
//! the implementations, never in the executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::message::{self, Message};
use crate::tool::ToolCall;

/// A request for one model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The transcript so far
    pub messages: Vec<Message>,

    /// System instructions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic)
    pub temperature: f32,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub input_schema: serde_json::Value,
}

/// A complete (non-streaming) model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text (may be empty when only tools are requested)
    pub content: String,

    /// Tools the model wants executed, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Provider stop reason (e.g. "end_turn", "tool_use")
    #[serde(default)]
    pub stop_reason: String,
}

impl ModelResponse {
    /// A plain text response with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: "end_turn".into(),
        }
    }

    /// A response requesting the given tool calls.
    pub fn tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            stop_reason: "tool_use".into(),
        }
    }
}

/// One increment of a streamed model response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A text delta
    Text(String),
    /// A fully assembled tool call
    ToolUse(ToolCall),
    /// Keep-alive, carries nothing
    Ping,
    /// Generation finished
    End { stop_reason: String },
    /// The transport failed mid-stream
    Error(ModelError),
}

/// The core ModelClient trait.
///
/// The executor calls `generate()` on the blocking path and
/// `stream_generate()` on the streaming path without knowing which
/// provider sits behind it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Send a request and get a stream of response events.
    ///
    /// Default implementation calls `generate()` and replays the result as
    /// text, tool-use and end events.
    async fn stream_generate(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ModelError> {
        let response = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(response.tool_calls.len() + 2);
        if !response.content.is_empty() {
            let _ = tx.send(StreamEvent::Text(response.content)).await;
        }
        for call in response.tool_calls {
            let _ = tx.send(StreamEvent::ToolUse(call)).await;
        }
        let _ = tx
            .send(StreamEvent::End {
                stop_reason: response.stop_reason,
            })
            .await;
        Ok(rx)
    }

    /// Estimate the token count of a transcript.
    fn count_tokens(&self, messages: &[Message]) -> usize {
        message::estimate_tokens(messages)
    }
}
