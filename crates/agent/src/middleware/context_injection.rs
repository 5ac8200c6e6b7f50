//! One-shot reminder injection.
//!
//! Any component holding the middleware can queue a text block. On the next
//! model call every pending block is wrapped in a `<system-reminder>` tag,
//! appended to the last request message, and dropped from the queue.

use async_trait::async_trait;
use deepagent_core::{ModelRequest, RunContext};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{HookResult, Middleware, append_to_last_message};

#[derive(Debug, Default)]
pub struct ContextInjectionMiddleware {
    pending: Mutex<Vec<String>>,
}

impl ContextInjectionMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a block unless an identical one is already pending.
    pub fn ensure_block(&self, text: impl Into<String>) {
        let text = text.into();
        let mut pending = self.pending();
        if !pending.contains(&text) {
            pending.push(text);
        }
    }

    pub fn remove_block(&self, text: &str) {
        let mut pending = self.pending();
        if let Some(index) = pending.iter().position(|b| b == text) {
            pending.remove(index);
        }
    }

    pub fn clear(&self) {
        self.pending().clear();
    }

    /// Snapshot of the queue, in insertion order.
    pub fn pending_blocks(&self) -> Vec<String> {
        self.pending().clone()
    }
}

fn render(blocks: &[String]) -> String {
    let mut injection = String::from("\n\n");
    for block in blocks {
        injection.push_str("<system-reminder>\n");
        injection.push_str(block);
        injection.push_str("\n</system-reminder>\n\n");
    }
    injection
}

#[async_trait]
impl Middleware for ContextInjectionMiddleware {
    fn name(&self) -> &str {
        "context_injection"
    }

    async fn before_model(&self, _ctx: &RunContext, request: &mut ModelRequest) -> HookResult {
        let blocks = std::mem::take(&mut *self.pending());
        if blocks.is_empty() {
            return Ok(());
        }
        tracing::debug!(blocks = blocks.len(), "Injecting reminders");
        append_to_last_message(request, &render(&blocks));
        Ok(())
    }
}
