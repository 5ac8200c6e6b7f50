//! Shared test helpers for executor and middleware tests.

use async_trait::async_trait;
use deepagent_core::{
    FnTool, HookError, HookStage, ModelClient, ModelError, ModelRequest, ModelResponse,
    RunContext, StreamEvent, ToolCall, ToolError, ToolResult, tool,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::middleware::{HookResult, Middleware, MiddlewareKind};
use crate::state::State;

/// A model client that replays scripted responses and records every request.
///
/// Once the script runs out, calls fail with an API error so a test that
/// loops too long fails loudly instead of hanging.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    streams: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(responses: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Raw event sequences returned by `stream_generate`, one per call,
    /// before falling back to replaying scripted responses.
    pub fn with_streams(self, streams: Vec<Vec<StreamEvent>>) -> Self {
        *self.streams.lock().unwrap() = streams.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ModelError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                })
            })
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.next(request)
    }

    async fn stream_generate(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ModelError> {
        let scripted = self.streams.lock().unwrap().pop_front();
        let events = match scripted {
            Some(events) => {
                self.requests.lock().unwrap().push(request);
                events
            }
            None => {
                let response = self.next(request)?;
                let mut events = Vec::new();
                if !response.content.is_empty() {
                    events.push(StreamEvent::Text(response.content));
                }
                events.extend(response.tool_calls.into_iter().map(StreamEvent::ToolUse));
                events.push(StreamEvent::End {
                    stop_reason: response.stop_reason,
                });
                events
            }
        };

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        Ok(rx)
    }
}

/// A tool call with a single `text` argument.
pub fn tool_call(id: &str, name: &str, text: &str) -> ToolCall {
    let mut input = tool::ToolInput::new();
    input.insert("text".into(), text.into());
    ToolCall::new(id, name, input)
}

/// `echo`: returns its `text` argument.
pub fn echo_tool() -> FnTool {
    FnTool::new(
        "echo",
        "Echoes back the input",
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }),
        |_ctx, input| async move {
            let text = tool::required_str(&input, "text")?;
            Ok::<_, ToolError>(text.to_string())
        },
    )
}

pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Records `"<name>:<hook>"` for every hook it sees; optionally fails at one stage.
pub struct RecordingMiddleware {
    name: String,
    kind: MiddlewareKind,
    log: HookLog,
    fail_at: Option<HookStage>,
}

impl RecordingMiddleware {
    pub fn new(name: &str, log: HookLog) -> Self {
        Self {
            name: name.to_string(),
            kind: MiddlewareKind::General,
            log,
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, stage: HookStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    pub fn with_kind(mut self, kind: MiddlewareKind) -> Self {
        self.kind = kind;
        self
    }

    fn record(&self, stage: HookStage, hook: &str) -> HookResult {
        self.log.lock().unwrap().push(format!("{}:{hook}", self.name));
        if self.fail_at == Some(stage) {
            return Err(HookError::new(&self.name, "refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MiddlewareKind {
        self.kind
    }

    async fn before_run(&self, _ctx: &RunContext, _state: &State) -> HookResult {
        self.record(HookStage::BeforeRun, "before_run")
    }

    async fn before_model(&self, _ctx: &RunContext, _request: &mut ModelRequest) -> HookResult {
        self.record(HookStage::BeforeModel, "before_model")
    }

    async fn after_model(
        &self,
        _ctx: &RunContext,
        _response: &mut ModelResponse,
        _state: &State,
    ) -> HookResult {
        self.record(HookStage::AfterModel, "after_model")
    }

    async fn before_tool(&self, _ctx: &RunContext, _call: &mut ToolCall, _state: &State) -> HookResult {
        self.record(HookStage::BeforeTool, "before_tool")
    }

    async fn after_tool(
        &self,
        _ctx: &RunContext,
        _result: &mut ToolResult,
        _state: &State,
    ) -> HookResult {
        self.record(HookStage::AfterTool, "after_tool")
    }
}
