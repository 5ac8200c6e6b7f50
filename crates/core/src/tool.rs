//! The Tool trait and the registry the executor dispatches through.
//!
//! Tools are what give the agent the ability to act: read files, run
//! commands, delegate to a nested agent. The core only knows the contract;
//! implementations are registered in a [`ToolRegistry`] shared by every run.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use crate::context::RunContext;
use crate::error::ToolError;
use crate::model::ToolSchema;

/// Tool arguments: argument name → JSON value.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// A model-requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub tool_call_id: String,

    /// The output (or the error description)
    pub content: String,

    /// Whether the call failed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "write_todos").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. `ctx` carries the nesting depth and cancellation.
    async fn execute(&self, ctx: &RunContext, input: ToolInput) -> Result<String, ToolError>;

    /// Convert this tool into a ToolSchema for sending to the model.
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

type ToolHandler =
    dyn Fn(RunContext, ToolInput) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync;

/// A tool backed by a closure.
pub struct FnTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    handler: Box<ToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(RunContext, ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Box::new(move |ctx, input| handler(ctx, input).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, ctx: &RunContext, input: ToolInput) -> Result<String, ToolError> {
        (self.handler)(ctx.clone(), input).await
    }
}

/// A registry of available tools.
///
/// Shared behind an `Arc` by every executor built for a session, including
/// nested sub-agent executors. Registration goes through `&self` so tools
/// can be added after the registry has been shared.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Names are unique; a second registration fails.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        tracing::debug!(tool = %name, "Registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool by name, returning it if present.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All tools, sorted by name so the catalogue sent to the model is stable.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Arc<dyn Tool>> = tools.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// All tool schemas (for sending to the model).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.list().iter().map(|t| t.to_schema()).collect()
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.list().iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required, non-empty string argument.
pub fn required_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str, ToolError> {
    match input.get(key).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ToolError::InvalidArguments(format!(
            "{key} must be a non-empty string"
        ))),
    }
}

/// Fetch an optional string argument; empty strings count as absent.
pub fn optional_str<'a>(input: &'a ToolInput, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
