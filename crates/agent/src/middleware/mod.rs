//! The middleware contract.
//!
//! A middleware exposes five hooks around the steps of a run. Each hook has a
//! no-op default, so implementations override only what they need. Hooks act
//! by mutating the request, response, call, result or state they receive; an
//! `Err` aborts the whole run.

mod chain;
pub mod context_injection;
pub mod round_counter;
pub mod subagent;
pub mod summarization;
pub mod todo;

use async_trait::async_trait;
use deepagent_core::{
    HookError, ModelRequest, ModelResponse, RunContext, ToolCall, ToolResult,
};

use crate::state::State;

pub use chain::MiddlewareChain;
pub use context_injection::ContextInjectionMiddleware;
pub use round_counter::RoundCounter;
pub use subagent::{SubAgentConfig, SubAgentMiddleware};
pub use summarization::{SummarizationConfig, SummarizationMiddleware};
pub use todo::TodoMiddleware;

/// Outcome of a single hook.
pub type HookResult = std::result::Result<(), HookError>;

/// What a middleware is, as far as the executor cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiddlewareKind {
    #[default]
    General,
    /// Spawns nested runs; never handed down to a nested run.
    Delegation,
}

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::General
    }

    /// Once per run, before the first model call.
    async fn before_run(&self, _ctx: &RunContext, _state: &State) -> HookResult {
        Ok(())
    }

    /// Before every model call. Changes only affect this request.
    async fn before_model(&self, _ctx: &RunContext, _request: &mut ModelRequest) -> HookResult {
        Ok(())
    }

    /// After every model call, once the assistant text has been recorded.
    async fn after_model(
        &self,
        _ctx: &RunContext,
        _response: &mut ModelResponse,
        _state: &State,
    ) -> HookResult {
        Ok(())
    }

    /// Before every tool call, including calls to unknown tools.
    async fn before_tool(
        &self,
        _ctx: &RunContext,
        _call: &mut ToolCall,
        _state: &State,
    ) -> HookResult {
        Ok(())
    }

    /// After every tool call, before the result is appended to the transcript.
    async fn after_tool(
        &self,
        _ctx: &RunContext,
        _result: &mut ToolResult,
        _state: &State,
    ) -> HookResult {
        Ok(())
    }
}

/// Append text to the last request message, or to the system prompt when
/// the transcript is empty.
pub(crate) fn append_to_last_message(request: &mut ModelRequest, text: &str) {
    match request.messages.last_mut() {
        Some(last) => last.content.push_str(text),
        None => request.system_prompt.push_str(text),
    }
}
