//! # deepagent Core
//!
//! Domain types, traits, and error definitions for the deepagent execution core.
//! This crate has **no runtime of its own**. It defines the vocabulary that
//! the executor, the middlewares, and every external collaborator share.
//!
//! ## Design Philosophy
//!
//! Every external capability is a trait here:
//! - [`ModelClient`]: the language-model transport
//! - [`Tool`]: one callable capability, collected in a [`ToolRegistry`]
//!
//! Implementations live outside the core, which keeps the execution loop
//! testable with scripted stand-ins.

pub mod context;
pub mod error;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::RunContext;
pub use error::{Error, HookError, HookStage, ModelError, Result, ToolError};
pub use message::{Message, Role};
pub use model::{ModelClient, ModelRequest, ModelResponse, StreamEvent, ToolSchema};
pub use tool::{FnTool, Tool, ToolCall, ToolInput, ToolRegistry, ToolResult};
