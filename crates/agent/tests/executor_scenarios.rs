//! End-to-end executor scenarios through the public API.
//!
//! A scripted model client stands in for a provider; every test drives the
//! real executor, middleware chain and tool registry.

use async_trait::async_trait;
use deepagent_agent::{
    AgentBuilder, AgentEvent, AgentEventType, Executor, HookResult, InvokeInput, Middleware,
    SubAgentConfig,
};
use deepagent_core::{
    Error, FnTool, HookError, Message, ModelClient, ModelError, ModelRequest, ModelResponse, Role,
    RunContext, ToolCall, ToolError, ToolInput, ToolRegistry, ToolResult,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ── Helpers ───────────────────────────────────────────────────────────────

struct ScriptedClient {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ModelRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            })
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
}

fn echo_tool(executions: Arc<Mutex<usize>>) -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "echo",
        "Echoes back the input",
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        move |_ctx, input: ToolInput| {
            *executions.lock().unwrap() += 1;
            let text = input
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            async move { Ok::<_, ToolError>(text) }
        },
    ))
}

fn registry_with_echo() -> (Arc<ToolRegistry>, Arc<Mutex<usize>>) {
    let executions = Arc::new(Mutex::new(0));
    let tools = Arc::new(ToolRegistry::new());
    tools.register(echo_tool(executions.clone())).unwrap();
    (tools, executions)
}

/// Records `"<name>:<hook>"`; optionally fails at one hook.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail_at: Option<&'static str>,
}

impl Recorder {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            fail_at: None,
        })
    }

    fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>, hook: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            fail_at: Some(hook),
        })
    }

    fn record(&self, hook: &str) -> HookResult {
        self.log.lock().unwrap().push(format!("{}:{hook}", self.name));
        if self.fail_at == Some(hook) {
            return Err(HookError::new(self.name, "refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn before_run(&self, _ctx: &RunContext, _state: &deepagent_agent::State) -> HookResult {
        self.record("before_run")
    }

    async fn before_model(&self, _ctx: &RunContext, _request: &mut ModelRequest) -> HookResult {
        self.record("before_model")
    }

    async fn after_model(
        &self,
        _ctx: &RunContext,
        _response: &mut ModelResponse,
        _state: &deepagent_agent::State,
    ) -> HookResult {
        self.record("after_model")
    }

    async fn before_tool(
        &self,
        _ctx: &RunContext,
        _call: &mut ToolCall,
        _state: &deepagent_agent::State,
    ) -> HookResult {
        self.record("before_tool")
    }

    async fn after_tool(
        &self,
        _ctx: &RunContext,
        _result: &mut ToolResult,
        _state: &deepagent_agent::State,
    ) -> HookResult {
        self.record("after_tool")
    }
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_text_only_response() {
    let client = ScriptedClient::new(vec![ModelResponse::text("Hello there!")]);
    let executor = Executor::new(client.clone(), Arc::new(ToolRegistry::new()));

    let output = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("Hi"))
        .await
        .unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(output.messages.len(), 2);
    assert_eq!(output.messages[1].role, Role::Assistant);
    assert_eq!(output.messages[1].content, "Hello there!");
}

#[tokio::test]
async fn scenario_b_one_tool_round() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools("Let me echo.", vec![call("c1", "echo", serde_json::json!({"text": "pong"}))]),
        ModelResponse::text("It said pong."),
    ]);
    let (tools, executions) = registry_with_echo();
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(client.clone(), tools).with_middleware(Recorder::new("rec", &log));

    let output = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("ping"))
        .await
        .unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(*executions.lock().unwrap(), 1);
    let after_tool = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.ends_with("after_tool"))
        .count();
    assert_eq!(after_tool, 1);

    let contents: Vec<_> = output.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["ping", "Let me echo.", "Tool echo result: pong", "It said pong."]
    );
    let result = output.messages[2].tool_result.clone().unwrap();
    assert_eq!(result.tool_call_id, "c1");
    assert!(!result.is_error);
}

#[tokio::test]
async fn scenario_c_unknown_tool_is_not_fatal() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools("", vec![call("c1", "does-not-exist", serde_json::json!({}))]),
        ModelResponse::text("Sorry."),
    ]);
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let executor = Executor::new(client.clone(), Arc::new(ToolRegistry::new()))
        .on_tool_result(move |_name, content, is_error| {
            *sink.lock().unwrap() = Some((content.to_string(), is_error));
        });

    let output = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("go"))
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        Some(("Tool not found: does-not-exist".to_string(), true))
    );
    assert_eq!(client.calls(), 2);
    let result = output.messages[1].tool_result.clone().unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "Tool not found: does-not-exist");
}

#[tokio::test]
async fn scenario_d_delegation_refused_at_max_depth() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools(
            "",
            vec![call("d1", "delegate_to_subagent", serde_json::json!({"task": "dig"}))],
        ),
        ModelResponse::text("gave up"),
    ]);
    let agent = AgentBuilder::new(client.clone())
        .subagents(SubAgentConfig {
            max_depth: Some(2),
            ..SubAgentConfig::default()
        })
        .build()
        .unwrap();

    let output = agent
        .invoke(&RunContext::new().at_depth(2), InvokeInput::from_text("go"))
        .await
        .unwrap();

    let result = output.messages[1].tool_result.clone().unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("maximum recursion depth"));
    // Refused before any nested model call
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn scenario_e_streaming_event_order() {
    let client = ScriptedClient::new(vec![ModelResponse::tools(
        "",
        vec![call("c1", "echo", serde_json::json!({"text": "x"}))],
    )]);
    let (tools, _) = registry_with_echo();
    let executor = Executor::new(client, tools).with_max_iterations(1);

    let events = collect(executor.invoke_stream(RunContext::new(), InvokeInput::from_text("go"))).await;

    let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AgentEventType::Start,
            AgentEventType::LlmStart,
            AgentEventType::LlmToolCall,
            AgentEventType::LlmEnd,
            AgentEventType::ToolStart,
            AgentEventType::ToolResult,
            AgentEventType::IterationEnd,
            AgentEventType::End,
        ]
    );
    let done: Vec<_> = events.iter().map(|e| e.done).collect();
    assert_eq!(done.iter().filter(|d| **d).count(), 1);
    assert!(events.last().unwrap().done);

    let output = events.last().unwrap().output().unwrap();
    assert_eq!(output.messages.last().unwrap().content, "Tool echo result: x");
}

// ── Pipeline properties ───────────────────────────────────────────────────

#[tokio::test]
async fn hooks_fire_in_registration_order() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools("", vec![call("c1", "echo", serde_json::json!({"text": "a"}))]),
        ModelResponse::text("done"),
    ]);
    let (tools, _) = registry_with_echo();
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(client, tools)
        .with_middleware(Recorder::new("a", &log))
        .with_middleware(Recorder::new("b", &log));

    executor
        .invoke(&RunContext::new(), InvokeInput::from_text("go"))
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "a:before_run", "b:before_run",
            "a:before_model", "b:before_model",
            "a:after_model", "b:after_model",
            "a:before_tool", "b:before_tool",
            "a:after_tool", "b:after_tool",
            "a:before_model", "b:before_model",
            "a:after_model", "b:after_model",
        ]
    );
}

#[tokio::test]
async fn failing_hook_aborts_the_run() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools("", vec![call("c1", "echo", serde_json::json!({"text": "a"}))]),
        ModelResponse::text("never reached"),
    ]);
    let (tools, executions) = registry_with_echo();
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(client.clone(), tools)
        .with_middleware(Recorder::new("a", &log))
        .with_middleware(Recorder::failing("b", &log, "before_tool"))
        .with_middleware(Recorder::new("c", &log));

    let err = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("go"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "before tool hook failed: b: refused");
    assert_eq!(*executions.lock().unwrap(), 0);
    assert_eq!(client.calls(), 1);
    let log = log.lock().unwrap();
    assert_eq!(log.last().unwrap(), "b:before_tool");
    assert!(!log.contains(&"c:before_tool".to_string()));
}

#[tokio::test]
async fn failing_hook_in_stream_emits_one_terminal_error() {
    let client = ScriptedClient::new(vec![ModelResponse::text("hi")]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(client.clone(), Arc::new(ToolRegistry::new()))
        .with_middleware(Recorder::failing("guard", &log, "before_model"));

    let events = collect(executor.invoke_stream(RunContext::new(), InvokeInput::from_text("go"))).await;

    let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![AgentEventType::Start, AgentEventType::Error]);
    let last = events.last().unwrap();
    assert!(last.done);
    assert!(last.error.as_deref().unwrap().starts_with("before model hook failed"));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn iteration_cap_bounds_model_calls() {
    let looping: Vec<_> = (0..5)
        .map(|i| {
            ModelResponse::tools(
                "again",
                vec![call(&format!("c{i}"), "echo", serde_json::json!({"text": "loop"}))],
            )
        })
        .collect();
    let client = ScriptedClient::new(looping);
    let (tools, executions) = registry_with_echo();
    let executor = Executor::new(client.clone(), tools).with_max_iterations(3);

    let output = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("go"))
        .await
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(*executions.lock().unwrap(), 3);
    assert_eq!(output.messages.len(), 1 + 3 * 2);
}

#[tokio::test]
async fn delegation_chain_fails_exactly_past_max_depth() {
    let delegate = |id: &str| {
        ModelResponse::tools(
            "",
            vec![call(id, "delegate_to_subagent", serde_json::json!({"task": "go deeper"}))],
        )
    };
    let client = ScriptedClient::new(vec![
        delegate("d0"),                    // depth 0 delegates
        delegate("d1"),                    // depth 1 delegates
        delegate("d2"),                    // depth 2 is refused
        ModelResponse::text("deepest"),    // depth 2 answers
        ModelResponse::text("middle"),     // depth 1 answers
        ModelResponse::text("top"),        // depth 0 answers
    ]);
    let agent = AgentBuilder::new(client.clone())
        .subagents(SubAgentConfig {
            max_depth: Some(2),
            ..SubAgentConfig::default()
        })
        .build()
        .unwrap();

    let output = agent
        .invoke(&RunContext::new(), InvokeInput::from_text("start"))
        .await
        .unwrap();

    assert_eq!(client.calls(), 6);
    assert_eq!(output.last_assistant_content(), Some("top"));
    assert_eq!(
        output.messages[1].content,
        "Tool delegate_to_subagent result: middle"
    );

    // The depth-2 run saw the refusal as an error-flagged tool result.
    let deepest_followup = client.request(3);
    let refusal = deepest_followup.messages.last().unwrap();
    assert!(refusal.content.contains("maximum recursion depth (2) exceeded"));
    assert!(refusal.tool_result.as_ref().unwrap().is_error);
    assert_eq!(deepest_followup.messages[0].content, "go deeper");
}

#[tokio::test]
async fn injected_context_reaches_exactly_one_call() {
    let client = ScriptedClient::new(vec![
        ModelResponse::tools("", vec![call("c1", "echo", serde_json::json!({"text": "a"}))]),
        ModelResponse::text("done"),
    ]);
    let executions = Arc::new(Mutex::new(0));
    let agent = AgentBuilder::new(client.clone())
        .tool(echo_tool(executions))
        .build()
        .unwrap();
    agent.injector().ensure_block("remember the deadline");

    let output = agent
        .invoke(&RunContext::new(), InvokeInput::from_text("question"))
        .await
        .unwrap();

    let reminded = |index: usize| {
        client
            .request(index)
            .messages
            .iter()
            .any(|m| m.content.contains("remember the deadline"))
    };
    assert!(reminded(0));
    assert!(!reminded(1));
    // State never sees the injection
    assert_eq!(output.messages[0].content, "question");
}

#[tokio::test]
async fn cancelled_before_start_makes_no_model_call() {
    let client = ScriptedClient::new(vec![ModelResponse::text("hi")]);
    let executor = Executor::new(client.clone(), Arc::new(ToolRegistry::new()));
    let token = CancellationToken::new();
    token.cancel();

    let err = executor
        .invoke(&RunContext::with_cancel(token), InvokeInput::from_text("go"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn cancellation_is_observed_before_the_next_tool() {
    let client = ScriptedClient::new(vec![ModelResponse::tools(
        "",
        vec![
            call("c1", "stop", serde_json::json!({})),
            call("c2", "echo", serde_json::json!({"text": "late"})),
        ],
    )]);
    let (tools, executions) = registry_with_echo();
    tools
        .register(Arc::new(FnTool::new(
            "stop",
            "Cancels the run",
            serde_json::json!({"type": "object"}),
            |ctx, _input| async move {
                ctx.cancel();
                Ok::<_, ToolError>("stopping".to_string())
            },
        )))
        .unwrap();
    let executor = Executor::new(client.clone(), tools);

    let err = executor
        .invoke(&RunContext::new(), InvokeInput::from_text("go"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(*executions.lock().unwrap(), 0);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn stream_adapter_yields_the_same_events() {
    let client = ScriptedClient::new(vec![ModelResponse::text("streamed")]);
    let executor = Executor::new(client, Arc::new(ToolRegistry::new()));

    let events: Vec<AgentEvent> = executor
        .stream(RunContext::new(), InvokeInput::new(vec![Message::user("go")]))
        .collect()
        .await;

    let text: String = events
        .iter()
        .filter(|e| e.event_type == AgentEventType::LlmText)
        .filter_map(|e| e.content.clone())
        .collect();
    assert_eq!(text, "streamed");
    assert_eq!(events.last().unwrap().event_type, AgentEventType::End);
}
