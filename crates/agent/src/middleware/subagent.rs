//! Sub-agent delegation.
//!
//! Registers the `delegate_to_subagent` tool. Each call runs a nested
//! [`Executor`] on a fresh State with the same model client and tool
//! registry, one level deeper than the caller. The parent's tool step awaits
//! the nested run, so delegation is strictly sequential.

use async_trait::async_trait;
use deepagent_core::{
    Message, ModelClient, RunContext, Tool, ToolError, ToolInput, ToolRegistry,
    tool::{optional_str, required_str},
};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{info, warn};

use super::{Middleware, MiddlewareChain, MiddlewareKind};
use crate::executor::Executor;
use crate::state::InvokeInput;

pub const DELEGATE_TOOL_NAME: &str = "delegate_to_subagent";

/// Returned when a nested run ends without any assistant text.
pub const NO_RESPONSE: &str = "Sub-agent completed but returned no response";

/// Settings for nested runs.
#[derive(Debug, Clone)]
pub struct SubAgentConfig {
    /// Deepest nesting level allowed; `None` is unbounded
    pub max_depth: Option<usize>,

    /// Maximum model calls per nested run
    pub max_iterations: usize,

    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(3),
            max_iterations: 10,
            system_prompt: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

struct Delegator {
    client: Arc<dyn ModelClient>,
    // The registry owns the delegate tool, which owns this.
    tools: Weak<ToolRegistry>,
    config: SubAgentConfig,
    middlewares: RwLock<MiddlewareChain>,
}

impl Delegator {
    fn middlewares(&self) -> MiddlewareChain {
        self.middlewares
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn delegate(
        &self,
        ctx: &RunContext,
        task: &str,
        context: Option<&str>,
    ) -> Result<String, ToolError> {
        let depth = ctx.depth();
        if let Some(max_depth) = self.config.max_depth {
            if depth >= max_depth {
                warn!(depth, max_depth, "Delegation refused: maximum depth reached");
                return Err(ToolError::RecursionDepthExceeded { max_depth });
            }
        }

        let tools = self.tools.upgrade().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: DELEGATE_TOOL_NAME.into(),
            reason: "tool registry is no longer available".into(),
        })?;

        let executor = Executor::new(self.client.clone(), tools)
            .with_system_prompt(self.config.system_prompt.clone())
            .with_max_iterations(self.config.max_iterations)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_middlewares(self.middlewares());

        let prompt = match context {
            Some(context) => format!("Context: {context}\n\nTask: {task}"),
            None => task.to_string(),
        };

        info!(depth = depth + 1, "Delegating task to sub-agent");
        let output = executor
            .invoke(&ctx.nested(), InvokeInput::new(vec![Message::user(prompt)]))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "subagent".into(),
                reason: e.to_string(),
            })?;

        Ok(output
            .last_assistant_content()
            .unwrap_or(NO_RESPONSE)
            .to_string())
    }
}

struct DelegateTool {
    delegator: Arc<Delegator>,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent. The sub-agent has the same \
         tools, starts with an empty conversation, and returns its final answer."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What the sub-agent should do"
                },
                "context": {
                    "type": "string",
                    "description": "Background the sub-agent needs"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, ctx: &RunContext, input: ToolInput) -> Result<String, ToolError> {
        let task = required_str(&input, "task")?;
        let context = optional_str(&input, "context");
        self.delegator.delegate(ctx, task, context).await
    }
}

/// Registers the delegation tool and carries the middlewares nested runs use.
pub struct SubAgentMiddleware {
    delegator: Arc<Delegator>,
}

impl SubAgentMiddleware {
    /// Create the middleware and register `delegate_to_subagent` on `tools`.
    pub fn new(
        client: Arc<dyn ModelClient>,
        tools: &Arc<ToolRegistry>,
        config: SubAgentConfig,
    ) -> Result<Self, ToolError> {
        let delegator = Arc::new(Delegator {
            client,
            tools: Arc::downgrade(tools),
            config,
            middlewares: RwLock::new(MiddlewareChain::default()),
        });
        tools.register(Arc::new(DelegateTool {
            delegator: delegator.clone(),
        }))?;
        Ok(Self { delegator })
    }

    /// Hand over the stack nested runs should use. Delegation middlewares
    /// are dropped so a nested run never carries this one.
    pub fn set_middlewares(&self, chain: impl Into<MiddlewareChain>) {
        let filtered = chain.into().without_kind(MiddlewareKind::Delegation);
        *self
            .delegator
            .middlewares
            .write()
            .unwrap_or_else(PoisonError::into_inner) = filtered;
    }

    pub fn middlewares(&self) -> MiddlewareChain {
        self.delegator.middlewares()
    }

    pub fn config(&self) -> &SubAgentConfig {
        &self.delegator.config
    }

    /// Run `task` in a nested agent one level below `ctx`.
    pub async fn delegate(
        &self,
        ctx: &RunContext,
        task: &str,
        context: Option<&str>,
    ) -> Result<String, ToolError> {
        self.delegator.delegate(ctx, task, context).await
    }
}

#[async_trait]
impl Middleware for SubAgentMiddleware {
    fn name(&self) -> &str {
        "subagent"
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Delegation
    }
}
