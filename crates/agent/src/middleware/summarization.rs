//! Transcript compaction.
//!
//! When a request grows past a token threshold, the older part of its
//! transcript is replaced by a model-written summary. Only the request copy
//! is rewritten; State keeps the full history.

use async_trait::async_trait;
use deepagent_core::{Message, ModelClient, ModelError, ModelRequest, RunContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::{HookResult, Middleware};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a conversation summarizer. Summarize the key \
    information of the conversation concisely, keeping important context, decisions and \
    conclusions.";

#[derive(Debug, Clone)]
pub struct SummarizationConfig {
    /// Estimated request size that triggers a summary
    pub max_tokens: usize,
    /// Length budget for the summary
    pub target_tokens: u32,
    /// Most recent messages left untouched
    pub keep_recent: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            target_tokens: 2000,
            keep_recent: 3,
        }
    }
}

pub struct SummarizationMiddleware {
    client: Arc<dyn ModelClient>,
    config: SummarizationConfig,
    summary_count: AtomicUsize,
    last_summary_size: AtomicUsize,
}

impl SummarizationMiddleware {
    pub fn new(client: Arc<dyn ModelClient>, config: SummarizationConfig) -> Self {
        Self {
            client,
            config,
            summary_count: AtomicUsize::new(0),
            last_summary_size: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SummarizationConfig {
        &self.config
    }

    /// Number of summaries produced so far.
    pub fn summary_count(&self) -> usize {
        self.summary_count.load(Ordering::Relaxed)
    }

    /// Length in bytes of the most recent summary.
    pub fn last_summary_size(&self) -> usize {
        self.last_summary_size.load(Ordering::Relaxed)
    }

    pub fn should_summarize(&self, messages: &[Message]) -> bool {
        messages.len() > self.config.keep_recent
            && self.client.count_tokens(messages) > self.config.max_tokens
    }

    async fn summarize(&self, older: &[Message]) -> Result<String, ModelError> {
        let mut prompt = String::from(
            "Summarize the key information of the following conversation, keeping \
             important context and decisions:\n\n",
        );
        for message in older {
            let role = match message.role {
                deepagent_core::Role::User => "user",
                deepagent_core::Role::Assistant => "assistant",
                deepagent_core::Role::System => "system",
            };
            prompt.push_str(&format!("{role}: {}\n\n", message.content));
        }

        let response = self
            .client
            .generate(ModelRequest {
                messages: vec![Message::user(prompt)],
                system_prompt: SUMMARY_SYSTEM_PROMPT.into(),
                tools: Vec::new(),
                max_tokens: self.config.target_tokens,
                temperature: 0.3,
            })
            .await?;
        Ok(response.content)
    }
}

#[async_trait]
impl Middleware for SummarizationMiddleware {
    fn name(&self) -> &str {
        "summarization"
    }

    async fn before_model(&self, _ctx: &RunContext, request: &mut ModelRequest) -> HookResult {
        if !self.should_summarize(&request.messages) {
            return Ok(());
        }

        let split = request.messages.len() - self.config.keep_recent;
        let summary = match self.summarize(&request.messages[..split]).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed, sending full transcript");
                return Ok(());
            }
        };

        debug!(
            summarized = split,
            kept = self.config.keep_recent,
            "Replacing older messages with a summary"
        );
        let recent = request.messages.split_off(split);
        request.messages = std::iter::once(Message::user(format!(
            "Summary of the earlier conversation:\n\n{summary}"
        )))
        .chain(recent)
        .collect();

        self.summary_count.fetch_add(1, Ordering::Relaxed);
        self.last_summary_size.store(summary.len(), Ordering::Relaxed);
        Ok(())
    }
}
