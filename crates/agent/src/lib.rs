//! The agent execution core: the iteration loop at the heart of deepagent.
//!
//! An [`Executor`] follows a **Model → Tools → Observe** cycle:
//!
//! 1. **Build** a request from the transcript, system prompt and tool catalogue
//! 2. **Run** `before_model` middleware hooks
//! 3. **Call** the model client
//! 4. **If tool calls**: execute each one between `before_tool`/`after_tool`
//!    hooks, append the results, loop back to step 1
//! 5. **If text only**: the run is complete
//!
//! The loop also ends when the iteration budget is spent. The same state
//! machine is exposed as a blocking call ([`Executor::invoke`]) and as a live
//! event stream ([`Executor::invoke_stream`]).
//!
//! Built-in middlewares live in [`middleware`]: one-shot context injection,
//! round counting, todo planning, summarization, and sub-agent delegation.

pub mod builder;
pub mod executor;
pub mod middleware;
pub mod state;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use builder::{Agent, AgentBuilder};
pub use executor::{Executor, ToolCallObserver, ToolResultObserver};
pub use middleware::{
    ContextInjectionMiddleware, HookResult, Middleware, MiddlewareChain, MiddlewareKind,
    RoundCounter, SubAgentConfig, SubAgentMiddleware, SummarizationConfig,
    SummarizationMiddleware, TodoMiddleware,
};
pub use state::{InvokeInput, InvokeOutput, State};
pub use stream_event::{AgentEvent, AgentEventType};
