//! Error types for the deepagent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::fmt;
use thiserror::Error;

/// The top-level error type for a run.
///
/// Every variant here is fatal to the run that produced it. Non-fatal
/// conditions (unknown tools, failing tools, exceeded delegation depth)
/// never surface as an `Error`; they become error-flagged tool results.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model transport ---
    #[error("llm generate failed: {0}")]
    Model(#[from] ModelError),

    // --- Tools (registry management only) ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Middleware hooks ---
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: HookError,
    },

    // --- Cancellation ---
    #[error("run cancelled")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The five extension points of the middleware pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeRun,
    BeforeModel,
    AfterModel,
    BeforeTool,
    AfterTool,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeRun => "before run",
            Self::BeforeModel => "before model",
            Self::AfterModel => "after model",
            Self::BeforeTool => "before tool",
            Self::AfterTool => "after tool",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by a single middleware hook.
#[derive(Debug, Clone, Error)]
#[error("{middleware}: {reason}")]
pub struct HookError {
    pub middleware: String,
    pub reason: String,
}

impl HookError {
    pub fn new(middleware: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            middleware: middleware.into(),
            reason: reason.into(),
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("tool [{0}] already registered")]
    AlreadyRegistered(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("maximum recursion depth ({max_depth}) exceeded")]
    RecursionDepthExceeded { max_depth: usize },

    #[error("tool execution cancelled")]
    Cancelled,
}
