//! Agent-level streaming events.
//!
//! `AgentEvent` describes one moment of a streaming run. The sequence for a
//! run is:
//!
//! - `start`
//! - per iteration: `llm_start`, any `llm_text` / `llm_tool_call`, `llm_end`,
//!   then per tool `tool_start` and `tool_result`, then `iteration_end`
//! - exactly one terminal `end` or `error` (the only events with `done`)

use deepagent_core::{Error, ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

use crate::state::InvokeOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    Start,
    LlmStart,
    LlmText,
    LlmToolCall,
    LlmEnd,
    ToolStart,
    ToolResult,
    IterationEnd,
    End,
    Error,
}

impl AgentEventType {
    /// Wire name for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::LlmStart => "llm_start",
            Self::LlmText => "llm_text",
            Self::LlmToolCall => "llm_tool_call",
            Self::LlmEnd => "llm_end",
            Self::ToolStart => "tool_start",
            Self::ToolResult => "tool_result",
            Self::IterationEnd => "iteration_end",
            Self::End => "end",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: AgentEventType,

    /// Text delta (`llm_text`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,

    /// 1-based iteration number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,

    /// Rendered error (`error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    /// True only on the terminal event
    #[serde(default)]
    pub done: bool,
}

impl AgentEvent {
    fn new(event_type: AgentEventType) -> Self {
        Self {
            event_type,
            content: None,
            tool_call: None,
            tool_result: None,
            iteration: None,
            error: None,
            metadata: None,
            done: false,
        }
    }

    fn at(event_type: AgentEventType, iteration: usize) -> Self {
        Self {
            iteration: Some(iteration),
            ..Self::new(event_type)
        }
    }

    pub fn start() -> Self {
        Self::new(AgentEventType::Start)
    }

    pub fn llm_start(iteration: usize) -> Self {
        Self::at(AgentEventType::LlmStart, iteration)
    }

    pub fn llm_text(iteration: usize, delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            ..Self::at(AgentEventType::LlmText, iteration)
        }
    }

    pub fn llm_tool_call(iteration: usize, call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::at(AgentEventType::LlmToolCall, iteration)
        }
    }

    pub fn llm_end(iteration: usize, stop_reason: &str) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("stop_reason".into(), stop_reason.into());
        Self {
            metadata: Some(metadata),
            ..Self::at(AgentEventType::LlmEnd, iteration)
        }
    }

    pub fn tool_start(iteration: usize, call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::at(AgentEventType::ToolStart, iteration)
        }
    }

    pub fn tool_result(iteration: usize, call: ToolCall, result: ToolResult) -> Self {
        Self {
            tool_call: Some(call),
            tool_result: Some(result),
            ..Self::at(AgentEventType::ToolResult, iteration)
        }
    }

    pub fn iteration_end(iteration: usize) -> Self {
        Self::at(AgentEventType::IterationEnd, iteration)
    }

    /// Terminal success; the metadata carries the final state.
    pub fn end(output: &InvokeOutput) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "messages".into(),
            serde_json::to_value(&output.messages).unwrap_or_default(),
        );
        metadata.insert(
            "files".into(),
            serde_json::to_value(&output.files).unwrap_or_default(),
        );
        metadata.insert(
            "metadata".into(),
            serde_json::to_value(&output.metadata).unwrap_or_default(),
        );
        Self {
            metadata: Some(metadata),
            done: true,
            ..Self::new(AgentEventType::End)
        }
    }

    /// Terminal failure.
    pub fn error(error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            done: true,
            ..Self::new(AgentEventType::Error)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }

    /// The final state carried by an `end` event.
    pub fn output(&self) -> Option<InvokeOutput> {
        if self.event_type != AgentEventType::End {
            return None;
        }
        let metadata = self.metadata.clone()?;
        serde_json::from_value(serde_json::Value::Object(metadata)).ok()
    }
}
