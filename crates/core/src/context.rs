//! Per-call run context.
//!
//! A [`RunContext`] is passed explicitly to every hook and every tool
//! execution. It carries the sub-agent nesting depth and a cooperative
//! cancellation token. It is deliberately separate from the run's State:
//! each nested run gets a fresh State, but the depth has to survive the
//! boundary.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RunContext {
    depth: usize,
    cancel: CancellationToken,
}

impl RunContext {
    /// A top-level context (depth 0) with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A top-level context observing an existing cancellation token.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self { depth: 0, cancel }
    }

    /// Override the nesting depth.
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Context for a nested run: one level deeper, cancelled whenever
    /// this context is cancelled.
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
