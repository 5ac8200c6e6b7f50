//! Assembling a ready-to-run agent.
//!
//! [`AgentBuilder`] owns the wiring: it creates the tool registry, stacks the
//! built-in middlewares in a fixed order (context injection, todo, sub-agent,
//! summarization, then custom ones) and hands the finished stack to the
//! sub-agent middleware for nested runs.

use std::sync::Arc;

use deepagent_config::AppConfig;
use deepagent_core::{ModelClient, Result, RunContext, Tool, ToolInput, ToolRegistry};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::executor::{Executor, ToolCallObserver, ToolResultObserver};
use crate::middleware::{
    ContextInjectionMiddleware, Middleware, MiddlewareChain, SubAgentConfig, SubAgentMiddleware,
    SummarizationConfig, SummarizationMiddleware, TodoMiddleware,
};
use crate::state::{InvokeInput, InvokeOutput};
use crate::stream_event::AgentEvent;

pub struct AgentBuilder {
    client: Arc<dyn ModelClient>,
    system_prompt: String,
    max_iterations: usize,
    max_tokens: u32,
    temperature: f32,
    tools: Vec<Arc<dyn Tool>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    subagents: Option<SubAgentConfig>,
    todo_threshold: Option<usize>,
    summarization: Option<SummarizationConfig>,
    on_tool_call: Option<ToolCallObserver>,
    on_tool_result: Option<ToolResultObserver>,
}

impl AgentBuilder {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            system_prompt: String::new(),
            max_iterations: 25,
            max_tokens: 4096,
            temperature: 0.7,
            tools: Vec::new(),
            middlewares: Vec::new(),
            subagents: None,
            todo_threshold: None,
            summarization: None,
            on_tool_call: None,
            on_tool_result: None,
        }
    }

    /// Start from a loaded configuration file.
    pub fn from_config(client: Arc<dyn ModelClient>, config: &AppConfig) -> Self {
        let agent = &config.agent;
        let mut builder = Self::new(client)
            .system_prompt(agent.system_prompt.clone())
            .max_iterations(agent.max_iterations)
            .max_tokens(agent.max_tokens)
            .temperature(agent.temperature);

        if config.subagent.enabled {
            builder = builder.subagents(SubAgentConfig {
                max_depth: config.subagent.depth_limit(),
                max_iterations: config.subagent.max_iterations,
                system_prompt: config
                    .subagent
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| agent.system_prompt.clone()),
                max_tokens: agent.max_tokens,
                temperature: agent.temperature,
            });
        }
        if config.todo.enabled {
            builder.todo_threshold = Some(config.todo.reminder_threshold);
        }
        if config.summarization.enabled {
            builder = builder.summarization(SummarizationConfig {
                max_tokens: config.summarization.max_tokens,
                target_tokens: config.summarization.target_tokens,
                keep_recent: config.summarization.keep_recent,
            });
        }
        builder
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add a custom middleware; custom middlewares run after the built-in ones.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Enable `delegate_to_subagent`.
    pub fn subagents(mut self, config: SubAgentConfig) -> Self {
        self.subagents = Some(config);
        self
    }

    /// Enable or disable `write_todos` and planning reminders.
    pub fn todo(mut self, enabled: bool) -> Self {
        self.todo_threshold = enabled.then_some(self.todo_threshold.unwrap_or(3));
        self
    }

    pub fn summarization(mut self, config: SummarizationConfig) -> Self {
        self.summarization = Some(config);
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

    /// Log every tool call and result through `tracing`.
    pub fn log_tool_activity(self) -> Self {
        self.on_tool_call(|name, input| {
            info!(tool = %name, args = input.len(), "Tool call");
        })
        .on_tool_result(|name, content, is_error| {
            if is_error {
                tracing::warn!(tool = %name, result = %content, "Tool failed");
            } else {
                info!(tool = %name, bytes = content.len(), "Tool finished");
            }
        })
    }

    pub fn build(self) -> Result<Agent> {
        let tools = Arc::new(ToolRegistry::new());
        for tool in self.tools {
            tools.register(tool)?;
        }

        let injector = Arc::new(ContextInjectionMiddleware::new());
        let mut stack: Vec<Arc<dyn Middleware>> = vec![injector.clone()];

        if let Some(threshold) = self.todo_threshold {
            let todo = TodoMiddleware::new(&tools, Some(injector.clone()))?;
            todo.set_reminder_threshold(threshold);
            stack.push(Arc::new(todo));
        }

        let subagent = match self.subagents {
            Some(config) => {
                let middleware = Arc::new(SubAgentMiddleware::new(
                    self.client.clone(),
                    &tools,
                    config,
                )?);
                stack.push(middleware.clone());
                Some(middleware)
            }
            None => None,
        };

        if let Some(config) = self.summarization {
            stack.push(Arc::new(SummarizationMiddleware::new(
                self.client.clone(),
                config,
            )));
        }

        stack.extend(self.middlewares);
        let chain = MiddlewareChain::new(stack);
        if let Some(subagent) = &subagent {
            subagent.set_middlewares(chain.clone());
        }

        info!(
            tools = tools.len(),
            middlewares = ?chain.names(),
            "Agent assembled"
        );

        let mut executor = Executor::new(self.client, tools.clone())
            .with_system_prompt(self.system_prompt)
            .with_max_iterations(self.max_iterations)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_middlewares(chain);
        if let Some(observer) = self.on_tool_call {
            executor = executor.on_tool_call(move |name, input| observer(name, input));
        }
        if let Some(observer) = self.on_tool_result {
            executor = executor.on_tool_result(move |name, content, is_error| {
                observer(name, content, is_error)
            });
        }

        Ok(Agent {
            executor,
            tools,
            injector,
            subagent,
        })
    }
}

/// A fully wired agent.
pub struct Agent {
    executor: Executor,
    tools: Arc<ToolRegistry>,
    injector: Arc<ContextInjectionMiddleware>,
    subagent: Option<Arc<SubAgentMiddleware>>,
}

impl Agent {
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Queue one-shot reminders for the next model call.
    pub fn injector(&self) -> &Arc<ContextInjectionMiddleware> {
        &self.injector
    }

    pub fn subagent(&self) -> Option<&Arc<SubAgentMiddleware>> {
        self.subagent.as_ref()
    }

    pub async fn invoke(&self, ctx: &RunContext, input: InvokeInput) -> Result<InvokeOutput> {
        self.executor.invoke(ctx, input).await
    }

    pub fn invoke_stream(&self, ctx: RunContext, input: InvokeInput) -> mpsc::Receiver<AgentEvent> {
        self.executor.invoke_stream(ctx, input)
    }

    pub fn stream(&self, ctx: RunContext, input: InvokeInput) -> ReceiverStream<AgentEvent> {
        self.executor.stream(ctx, input)
    }

    /// Run a single prompt at top level and return the final answer.
    pub async fn run(&self, prompt: impl Into<String>) -> Result<String> {
        let output = self
            .invoke(&RunContext::new(), InvokeInput::from_text(prompt))
            .await?;
        Ok(output.last_assistant_content().unwrap_or_default().to_string())
    }
}
