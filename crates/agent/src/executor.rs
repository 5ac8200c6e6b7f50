//! The agent iteration loop.

use std::sync::Arc;

use deepagent_core::{
    Error, Message, ModelClient, ModelRequest, ModelResponse, Result, RunContext, StreamEvent,
    ToolCall, ToolError, ToolInput, ToolRegistry, ToolResult,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::middleware::{Middleware, MiddlewareChain};
use crate::state::{InvokeInput, InvokeOutput, State};
use crate::stream_event::AgentEvent;

/// Capacity of the streaming event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 20;

/// Called with `(tool_name, input)` right before a tool step's hooks run.
pub type ToolCallObserver = Arc<dyn Fn(&str, &ToolInput) + Send + Sync>;

/// Called with `(tool_name, content, is_error)` right after a tool ran.
pub type ToolResultObserver = Arc<dyn Fn(&str, &str, bool) + Send + Sync>;

/// Drives the model → tools loop.
///
/// Immutable once built and cheap to clone: everything it holds is shared.
#[derive(Clone)]
pub struct Executor {
    /// The model transport
    client: Arc<dyn ModelClient>,

    /// Tools offered to the model
    tools: Arc<ToolRegistry>,

    /// Hooks around every step
    chain: MiddlewareChain,

    /// System instructions
    system_prompt: String,

    /// Maximum model calls per run
    max_iterations: usize,

    /// Maximum tokens per model response
    max_tokens: u32,

    temperature: f32,

    on_tool_call: Option<ToolCallObserver>,
    on_tool_result: Option<ToolResultObserver>,
}

impl Executor {
    /// Create an executor with default limits (25 iterations, 4096 tokens,
    /// temperature 0.7) and no middleware.
    pub fn new(client: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            tools,
            chain: MiddlewareChain::default(),
            system_prompt: String::new(),
            max_iterations: 25,
            max_tokens: 4096,
            temperature: 0.7,
            on_tool_call: None,
            on_tool_result: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of model calls per run.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Append one middleware to the chain.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Replace the whole chain.
    pub fn with_middlewares(mut self, chain: impl Into<MiddlewareChain>) -> Self {
        self.chain = chain.into();
        self
    }

    pub fn on_tool_call<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, &ToolInput) + Send + Sync + 'static,
    {
        self.on_tool_call = Some(Arc::new(observer));
        self
    }

    pub fn on_tool_result<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, &str, bool) + Send + Sync + 'static,
    {
        self.on_tool_result = Some(Arc::new(observer));
        self
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn middlewares(&self) -> &MiddlewareChain {
        &self.chain
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Run to completion and return the final state.
    pub async fn invoke(&self, ctx: &RunContext, input: InvokeInput) -> Result<InvokeOutput> {
        info!(
            depth = ctx.depth(),
            messages = input.messages.len(),
            "Starting run"
        );
        let state = State::from_input(input);
        self.run_loop(ctx, &state, &Events::none()).await?;
        Ok(state.into_output())
    }

    /// Run in a background task, reporting progress as [`AgentEvent`]s.
    ///
    /// The channel carries exactly one terminal `end` or `error` event and
    /// closes right after it. Must be called from within a Tokio runtime.
    pub fn invoke_stream(&self, ctx: RunContext, input: InvokeInput) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let executor = self.clone();

        tokio::spawn(async move {
            info!(
                depth = ctx.depth(),
                messages = input.messages.len(),
                "Starting streaming run"
            );
            let _ = tx.send(AgentEvent::start()).await;

            let state = State::from_input(input);
            let events = Events::to(&tx);
            let terminal = match executor.run_loop(&ctx, &state, &events).await {
                Ok(()) => AgentEvent::end(&state.into_output()),
                Err(e) => {
                    warn!(error = %e, "Streaming run failed");
                    AgentEvent::error(&e)
                }
            };
            let _ = tx.send(terminal).await;
        });

        rx
    }

    /// [`invoke_stream`](Self::invoke_stream) as a `Stream`.
    pub fn stream(&self, ctx: RunContext, input: InvokeInput) -> ReceiverStream<AgentEvent> {
        ReceiverStream::new(self.invoke_stream(ctx, input))
    }

    /// The state machine shared by both entry points.
    async fn run_loop(&self, ctx: &RunContext, state: &State, events: &Events<'_>) -> Result<()> {
        self.chain.before_run(ctx, state).await?;

        for iteration in 1..=self.max_iterations {
            if ctx.is_cancelled() || events.receiver_gone() {
                info!(iteration, "Run cancelled before model call");
                return Err(Error::Cancelled);
            }

            debug!(iteration, depth = ctx.depth(), "Agent loop iteration");

            let mut request = self.build_request(state);
            self.chain.before_model(ctx, &mut request).await?;

            events.emit(AgentEvent::llm_start(iteration)).await;
            let mut response = if events.is_streaming() {
                self.stream_model(request, events, iteration).await?
            } else {
                self.client.generate(request).await?
            };

            if !response.content.is_empty() {
                state.add_message(
                    Message::assistant(response.content.clone())
                        .with_tool_calls(response.tool_calls.clone()),
                );
            }

            self.chain.after_model(ctx, &mut response, state).await?;

            if response.tool_calls.is_empty() {
                events.emit(AgentEvent::iteration_end(iteration)).await;
                info!(iterations = iteration, "Run complete");
                return Ok(());
            }

            debug!(tool_count = response.tool_calls.len(), "Executing tool calls");
            for call in response.tool_calls {
                self.run_tool(ctx, state, events, iteration, call).await?;
            }
            events.emit(AgentEvent::iteration_end(iteration)).await;
        }

        warn!(
            max_iterations = self.max_iterations,
            "Max iterations reached, ending run"
        );
        Ok(())
    }

    fn build_request(&self, state: &State) -> ModelRequest {
        ModelRequest {
            messages: state.messages(),
            system_prompt: self.system_prompt.clone(),
            tools: self.tools.schemas(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Consume a model stream, forwarding deltas and assembling the response.
    async fn stream_model(
        &self,
        request: ModelRequest,
        events: &Events<'_>,
        iteration: usize,
    ) -> Result<ModelResponse> {
        let mut stream = self.client.stream_generate(request).await?;
        let mut response = ModelResponse::default();
        let mut ended = false;

        while let Some(event) = stream.recv().await {
            match event {
                StreamEvent::Text(delta) => {
                    response.content.push_str(&delta);
                    events.emit(AgentEvent::llm_text(iteration, delta)).await;
                }
                StreamEvent::ToolUse(call) => {
                    events
                        .emit(AgentEvent::llm_tool_call(iteration, call.clone()))
                        .await;
                    response.tool_calls.push(call);
                }
                StreamEvent::Ping => {}
                StreamEvent::End { stop_reason } => {
                    if !ended {
                        events.emit(AgentEvent::llm_end(iteration, &stop_reason)).await;
                        ended = true;
                    }
                    response.stop_reason = stop_reason;
                }
                StreamEvent::Error(e) => return Err(e.into()),
            }
        }

        // A stream that closes without an End event still completes the turn.
        if !ended {
            events
                .emit(AgentEvent::llm_end(iteration, &response.stop_reason))
                .await;
        }
        Ok(response)
    }

    /// One tool step: hooks, lookup, execution, transcript append.
    async fn run_tool(
        &self,
        ctx: &RunContext,
        state: &State,
        events: &Events<'_>,
        iteration: usize,
        mut call: ToolCall,
    ) -> Result<()> {
        if ctx.is_cancelled() || events.receiver_gone() {
            info!(tool = %call.name, "Run cancelled before tool call");
            return Err(Error::Cancelled);
        }

        events.emit(AgentEvent::tool_start(iteration, call.clone())).await;
        if let Some(observer) = &self.on_tool_call {
            observer(&call.name, &call.input);
        }

        self.chain.before_tool(ctx, &mut call, state).await?;

        let mut result = match self.tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, "Model requested an unknown tool");
                ToolResult::error(&call.id, ToolError::NotFound(call.name.clone()).to_string())
            }
            Some(tool) => {
                let start = std::time::Instant::now();
                let outcome = tool.execute(ctx, call.input.clone()).await;
                let duration_ms = start.elapsed().as_millis() as u64;
                match outcome {
                    Ok(output) => {
                        debug!(tool = %call.name, duration_ms, "Tool executed");
                        ToolResult::success(&call.id, output)
                    }
                    Err(e) => {
                        warn!(tool = %call.name, duration_ms, error = %e, "Tool execution failed");
                        ToolResult::error(&call.id, format!("Tool execution error: {e}"))
                    }
                }
            }
        };

        if let Some(observer) = &self.on_tool_result {
            observer(&call.name, &result.content, result.is_error);
        }

        self.chain.after_tool(ctx, &mut result, state).await?;

        events
            .emit(AgentEvent::tool_result(iteration, call.clone(), result.clone()))
            .await;
        state.add_message(Message::tool_output(&call.name, result));
        Ok(())
    }
}

/// Where loop transitions are reported; nowhere on the blocking path.
struct Events<'a> {
    tx: Option<&'a mpsc::Sender<AgentEvent>>,
}

impl<'a> Events<'a> {
    fn none() -> Self {
        Self { tx: None }
    }

    fn to(tx: &'a mpsc::Sender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    /// The consumer dropped its receiver; treated like cancellation.
    fn receiver_gone(&self) -> bool {
        self.tx.is_some_and(|tx| tx.is_closed())
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = self.tx {
            if tx.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}
