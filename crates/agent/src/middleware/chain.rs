use std::sync::Arc;

use deepagent_core::{
    Error, HookError, HookStage, ModelRequest, ModelResponse, Result, RunContext, ToolCall,
    ToolResult,
};
use tracing::debug;

use super::{Middleware, MiddlewareKind};
use crate::state::State;

/// An ordered list of middlewares.
///
/// Every hook runs on every middleware in registration order. The first
/// failure stops the chain and is returned tagged with its stage; mutations
/// made by earlier middlewares are kept.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn as_slice(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// A copy of this chain without middlewares of the given kind.
    pub fn without_kind(&self, kind: MiddlewareKind) -> Self {
        Self {
            middlewares: self
                .middlewares
                .iter()
                .filter(|m| m.kind() != kind)
                .cloned()
                .collect(),
        }
    }

    pub async fn before_run(&self, ctx: &RunContext, state: &State) -> Result<()> {
        for m in &self.middlewares {
            m.before_run(ctx, state)
                .await
                .map_err(|e| hook_failed(HookStage::BeforeRun, e))?;
        }
        Ok(())
    }

    pub async fn before_model(&self, ctx: &RunContext, request: &mut ModelRequest) -> Result<()> {
        for m in &self.middlewares {
            m.before_model(ctx, request)
                .await
                .map_err(|e| hook_failed(HookStage::BeforeModel, e))?;
        }
        Ok(())
    }

    pub async fn after_model(
        &self,
        ctx: &RunContext,
        response: &mut ModelResponse,
        state: &State,
    ) -> Result<()> {
        for m in &self.middlewares {
            m.after_model(ctx, response, state)
                .await
                .map_err(|e| hook_failed(HookStage::AfterModel, e))?;
        }
        Ok(())
    }

    pub async fn before_tool(&self, ctx: &RunContext, call: &mut ToolCall, state: &State) -> Result<()> {
        for m in &self.middlewares {
            m.before_tool(ctx, call, state)
                .await
                .map_err(|e| hook_failed(HookStage::BeforeTool, e))?;
        }
        Ok(())
    }

    pub async fn after_tool(
        &self,
        ctx: &RunContext,
        result: &mut ToolResult,
        state: &State,
    ) -> Result<()> {
        for m in &self.middlewares {
            m.after_tool(ctx, result, state)
                .await
                .map_err(|e| hook_failed(HookStage::AfterTool, e))?;
        }
        Ok(())
    }
}

impl From<Vec<Arc<dyn Middleware>>> for MiddlewareChain {
    fn from(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self::new(middlewares)
    }
}

fn hook_failed(stage: HookStage, source: HookError) -> Error {
    debug!(stage = %stage, middleware = %source.middleware, "Hook failed");
    Error::Hook { stage, source }
}
