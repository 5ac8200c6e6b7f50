//! Configuration loading, validation, and management for deepagent.
//!
//! Loads configuration from `~/.deepagent/config.toml` with environment
//! variable overrides. Validates all settings before they reach an executor.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deepagent/config.toml`. Every section is optional
/// in the file; missing sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Top-level executor settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Sub-agent delegation
    #[serde(default)]
    pub subagent: SubAgentSection,

    /// Todo planning middleware
    #[serde(default)]
    pub todo: TodoConfig,

    /// Transcript summarization middleware
    #[serde(default)]
    pub summarization: SummarizationSection,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System instructions sent with every model request
    #[serde(default)]
    pub system_prompt: String,

    /// Maximum model calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_iterations() -> usize {
    25
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSection {
    /// Register the `delegate_to_subagent` tool
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Deepest nesting level allowed; 0 disables the limit
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum model calls per nested run
    #[serde(default = "default_subagent_iterations")]
    pub max_iterations: usize,

    /// Instructions for nested runs; falls back to the agent's prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_depth() -> usize {
    3
}
fn default_subagent_iterations() -> usize {
    10
}

impl SubAgentSection {
    /// The depth limit as an option (`None` means unbounded).
    pub fn depth_limit(&self) -> Option<usize> {
        (self.max_depth > 0).then_some(self.max_depth)
    }
}

impl Default for SubAgentSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: default_max_depth(),
            max_iterations: default_subagent_iterations(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rounds without a `write_todos` call before a reminder is injected
    #[serde(default = "default_reminder_threshold")]
    pub reminder_threshold: usize,
}

fn default_reminder_threshold() -> usize {
    3
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_threshold: default_reminder_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationSection {
    #[serde(default)]
    pub enabled: bool,

    /// Estimated request size that triggers a summary
    #[serde(default = "default_summary_trigger")]
    pub max_tokens: usize,

    /// Length budget for the summary itself
    #[serde(default = "default_summary_target")]
    pub target_tokens: u32,

    /// Most recent messages left untouched
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_summary_trigger() -> usize {
    8000
}
fn default_summary_target() -> u32 {
    2000
}
fn default_keep_recent() -> usize {
    3
}

impl Default for SummarizationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens: default_summary_trigger(),
            target_tokens: default_summary_target(),
            keep_recent: default_keep_recent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Include the event target (module path) in each line
    #[serde(default)]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            with_target: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deepagent/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `DEEPAGENT_SYSTEM_PROMPT`
    /// - `DEEPAGENT_MAX_ITERATIONS`
    /// - `DEEPAGENT_MAX_TOKENS`
    /// - `DEEPAGENT_TEMPERATURE`
    /// - `DEEPAGENT_SUBAGENT_MAX_DEPTH`
    /// - `DEEPAGENT_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment),
    /// then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prompt) = lookup("DEEPAGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }
        if let Some(value) = lookup("DEEPAGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_override("DEEPAGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = lookup("DEEPAGENT_MAX_TOKENS") {
            self.agent.max_tokens = parse_override("DEEPAGENT_MAX_TOKENS", &value)?;
        }
        if let Some(value) = lookup("DEEPAGENT_TEMPERATURE") {
            self.agent.temperature = parse_override("DEEPAGENT_TEMPERATURE", &value)?;
        }
        if let Some(value) = lookup("DEEPAGENT_SUBAGENT_MAX_DEPTH") {
            self.subagent.max_depth = parse_override("DEEPAGENT_SUBAGENT_MAX_DEPTH", &value)?;
        }
        if let Some(level) = lookup("DEEPAGENT_LOG_LEVEL") {
            self.logging.level = level;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deepagent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.agent.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tokens must be at least 1".into(),
            ));
        }
        if self.subagent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "subagent.max_iterations must be at least 1".into(),
            ));
        }
        if self.todo.reminder_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "todo.reminder_threshold must be at least 1".into(),
            ));
        }
        let summary = &self.summarization;
        if summary.max_tokens == 0 || summary.target_tokens == 0 || summary.keep_recent == 0 {
            return Err(ConfigError::ValidationError(
                "summarization thresholds must be greater than 0".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: {value}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
