//! Per-run mutable state.
//!
//! A fresh [`State`] is created for every `invoke`/`invoke_stream` call,
//! including each nested sub-agent run, and consumed when the call returns.

use deepagent_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Input to a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeInput {
    /// Initial transcript
    pub messages: Vec<Message>,

    /// Initial virtual files (path → content)
    #[serde(default)]
    pub files: HashMap<String, String>,

    /// Initial metadata (e.g. `session_id`)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InvokeInput {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A single user message.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Final state of a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeOutput {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InvokeOutput {
    /// Content of the last assistant message, if the model said anything.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Default)]
struct StateInner {
    messages: Vec<Message>,
    files: HashMap<String, String>,
    metadata: HashMap<String, serde_json::Value>,
}

/// Transcript, virtual files and metadata behind one read/write lock.
///
/// Readers always get snapshots. The transcript is append-only.
#[derive(Debug, Default)]
pub struct State {
    inner: RwLock<StateInner>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_input(input: InvokeInput) -> Self {
        Self {
            inner: RwLock::new(StateInner {
                messages: input.messages,
                files: input.files,
                metadata: input.metadata,
            }),
        }
    }

    // The guarded data is plain values, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, StateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_message(&self, message: Message) {
        self.write().messages.push(message);
    }

    /// Snapshot of the full transcript.
    pub fn messages(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.read().messages.len()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.read().messages.last().cloned()
    }

    pub fn set_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.write().files.insert(path.into(), content.into());
    }

    pub fn get_file(&self, path: &str) -> Option<String> {
        self.read().files.get(path).cloned()
    }

    pub fn files(&self) -> HashMap<String, String> {
        self.read().files.clone()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.write().metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.read().metadata.get(key).cloned()
    }

    pub fn metadata(&self) -> HashMap<String, serde_json::Value> {
        self.read().metadata.clone()
    }

    /// Snapshot the state as a run output without consuming it.
    pub fn to_output(&self) -> InvokeOutput {
        let inner = self.read();
        InvokeOutput {
            messages: inner.messages.clone(),
            files: inner.files.clone(),
            metadata: inner.metadata.clone(),
        }
    }

    pub fn into_output(self) -> InvokeOutput {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        InvokeOutput {
            messages: inner.messages,
            files: inner.files,
            metadata: inner.metadata,
        }
    }
}
