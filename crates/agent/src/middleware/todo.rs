//! Todo planning.
//!
//! Registers the `write_todos` tool and keeps one list per session (keyed by
//! the `session_id` metadata value). While a list exists, every model request
//! is anchored to the task goal and carries a progress reminder. A
//! [`RoundCounter`] nags the model when it goes several rounds without
//! updating its plan.

use async_trait::async_trait;
use deepagent_core::{
    ModelRequest, ModelResponse, Role, RunContext, Tool, ToolError, ToolInput, ToolRegistry,
    tool::optional_str,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ContextInjectionMiddleware, HookResult, Middleware, RoundCounter, append_to_last_message};
use crate::state::State;

pub const WRITE_TODOS_TOOL_NAME: &str = "write_todos";

const DEFAULT_SESSION: &str = "default";
const DEFAULT_REMINDER_THRESHOLD: usize = 3;
const DEFAULT_WARNING: &str = "Reminder: you have gone several rounds without using the \
    write_todos tool. For complex tasks (3+ steps), plan and track progress with a todo list.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Completed => "[x]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub items: Vec<TodoItem>,
}

impl TodoList {
    /// `(completed, total)`
    pub fn progress(&self) -> (usize, usize) {
        let completed = self
            .items
            .iter()
            .filter(|i| i.status == TodoStatus::Completed)
            .count();
        (completed, self.items.len())
    }

    fn all_completed(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.status == TodoStatus::Completed)
    }

    /// Markdown rendering shown to the model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(goal) = &self.goal {
            out.push_str(&format!("# Goal\n\n{goal}\n\n"));
        }
        out.push_str("# Todo List\n\n");
        for item in &self.items {
            out.push_str(&format!(
                "## {} {} [{}]\n\n",
                item.status.marker(),
                item.title,
                item.id
            ));
            if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
                out.push_str(description);
                out.push_str("\n\n");
            }
        }
        out
    }
}

struct TodoShared {
    session: Mutex<String>,
    lists: Mutex<HashMap<String, TodoList>>,
    counter: RoundCounter,
}

impl TodoShared {
    fn session(&self) -> String {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lists(&self) -> MutexGuard<'_, HashMap<String, TodoList>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<TodoList> {
        let session = self.session();
        self.lists().get(&session).cloned()
    }

    fn write(&self, input: &ToolInput) -> Result<String, ToolError> {
        let raw = input
            .get("todos")
            .filter(|v| v.is_array())
            .cloned()
            .ok_or_else(|| ToolError::InvalidArguments("todos must be an array".into()))?;
        let items: Vec<TodoItem> = serde_json::from_value(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid todo item: {e}")))?;

        let session = self.session();
        let mut lists = self.lists();
        let goal = optional_str(input, "goal")
            .map(str::to_string)
            .or_else(|| lists.get(&session).and_then(|l| l.goal.clone()));
        let list = TodoList { goal, items };
        let count = list.items.len();
        self.counter.reset();

        if list.all_completed() {
            lists.remove(&session);
            return Ok(format!(
                "All {count} todo items completed, todo list cleaned up"
            ));
        }
        lists.insert(session, list);
        Ok(format!("Successfully updated {count} todo items"))
    }
}

struct WriteTodosTool {
    shared: Arc<TodoShared>,
}

#[async_trait]
impl Tool for WriteTodosTool {
    fn name(&self) -> &str {
        WRITE_TODOS_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Write or update the todo list. Use it to plan work and track progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "The user's core request. Required when creating the list; omit to keep the current goal."
                },
                "todos": {
                    "type": "array",
                    "description": "Todo items",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "Unique item id" },
                            "title": { "type": "string", "description": "Item title" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            },
                            "description": { "type": "string", "description": "Details" }
                        },
                        "required": ["id", "title", "status"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, _ctx: &RunContext, input: ToolInput) -> Result<String, ToolError> {
        self.shared.write(&input)
    }
}

pub struct TodoMiddleware {
    shared: Arc<TodoShared>,
}

impl TodoMiddleware {
    /// Create the middleware and register `write_todos` on `tools`.
    ///
    /// Without an injector the round counter still counts but never warns.
    pub fn new(
        tools: &ToolRegistry,
        injector: Option<Arc<ContextInjectionMiddleware>>,
    ) -> Result<Self, ToolError> {
        let shared = Arc::new(TodoShared {
            session: Mutex::new(DEFAULT_SESSION.to_string()),
            lists: Mutex::new(HashMap::new()),
            counter: RoundCounter::new(DEFAULT_REMINDER_THRESHOLD, injector, DEFAULT_WARNING),
        });
        tools.register(Arc::new(WriteTodosTool {
            shared: shared.clone(),
        }))?;
        Ok(Self { shared })
    }

    pub fn set_reminder_threshold(&self, rounds: usize) {
        self.shared.counter.set_threshold(rounds);
    }

    pub fn rounds_without_todo(&self) -> usize {
        self.shared.counter.count()
    }

    pub fn reset_rounds(&self) {
        self.shared.counter.reset();
    }

    /// The list for the active session.
    pub fn current_list(&self) -> Option<TodoList> {
        self.shared.current()
    }

    pub fn list_for(&self, session_id: &str) -> Option<TodoList> {
        self.shared.lists().get(session_id).cloned()
    }
}

fn first_user_text<'a>(messages: impl IntoIterator<Item = &'a deepagent_core::Message>) -> Option<String> {
    messages
        .into_iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
}

#[async_trait]
impl Middleware for TodoMiddleware {
    fn name(&self) -> &str {
        "todo"
    }

    async fn before_run(&self, _ctx: &RunContext, state: &State) -> HookResult {
        if let Some(session) = state
            .get_metadata("session_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
        {
            *self
                .shared
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = session;
        }

        if state.get_metadata("original_request").is_none() {
            if let Some(request) = first_user_text(&state.messages()) {
                state.set_metadata("original_request", request.into());
            }
        }

        if let Some(list) = self.shared.current() {
            state.set_metadata(
                "todos",
                serde_json::to_value(&list).unwrap_or_default(),
            );
        }
        Ok(())
    }

    async fn before_model(&self, _ctx: &RunContext, request: &mut ModelRequest) -> HookResult {
        let Some(list) = self.shared.current() else {
            return Ok(());
        };

        let goal = list
            .goal
            .clone()
            .or_else(|| first_user_text(&request.messages));
        if let Some(goal) = goal {
            request
                .system_prompt
                .push_str(&format!("\n\n## Task goal\n{goal}\n"));
        }

        let (completed, total) = list.progress();
        let reminder = format!(
            "\n\n<system-reminder>\n## Task progress ({completed}/{total} completed)\n{}\
             ### Next step\nWork toward the task goal. After finishing the current \
             in_progress item, update the list with write_todos.\n</system-reminder>\n",
            list.render()
        );
        append_to_last_message(request, &reminder);
        Ok(())
    }

    async fn after_model(
        &self,
        _ctx: &RunContext,
        response: &mut ModelResponse,
        state: &State,
    ) -> HookResult {
        let used = response
            .tool_calls
            .iter()
            .any(|c| c.name == WRITE_TODOS_TOOL_NAME);

        if !used {
            let original = state
                .get_metadata("original_request")
                .and_then(|v| v.as_str().map(str::to_string))
                .or_else(|| self.shared.current().and_then(|l| l.goal));
            if let Some(original) = original.filter(|s| !s.is_empty()) {
                self.shared.counter.set_warning_message(format!(
                    "Reminder: you have gone several rounds without using the write_todos \
                     tool. The user's original request was: \"{original}\". Plan and track \
                     progress toward it with a todo list."
                ));
            }
        }

        self.shared.counter.track(used);
        Ok(())
    }
}
