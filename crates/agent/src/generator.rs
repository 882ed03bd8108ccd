//! Completion request assembly and the call to the completion service.
//!
//! Citations come from the context that was sent, never from the model's
//! text.

use crate::composer::ComposedContext;
use mimir_config::CompletionConfig;
use mimir_core::error::ChatError;
use mimir_core::message::{Message, Role};
use mimir_core::provider::{Provider, ProviderRequest, Usage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub cited_sources: Vec<String>,
    pub model: String,
    pub usage: Option<Usage>,
}

/// Persona and grounding rules for one role.
pub fn system_prompt(role: &str) -> String {
    format!(
        "You are Mimir, an AI assistant for a {role} user.\n\
         Use the context below, drawn from multiple sources, to answer the question. \
         Each context line starts with its [source label].\n\
         Prioritize the most relevant and recent information.\n\
         Tailor your response to the {role} perspective. \
         If you don't have enough information, say so clearly."
    )
}

/// `[Context]` block: one `[label] text` line per passage.
pub fn context_block(context: &ComposedContext) -> String {
    let mut block = String::from("[Context]");
    if context.is_empty() {
        block.push_str("\n(no retrieved context)");
    }
    for item in &context.items {
        block.push_str(&format!("\n[{}] {}", item.passage.source_label, item.passage.text));
    }
    block
}

pub struct AnswerGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    history_turns: usize,
    timeout: Duration,
}

impl std::fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("history_turns", &self.history_turns)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn Provider>, config: &CompletionConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            history_turns: config.history_turns,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// System framing with context, the last `history_turns` turns, then the query.
    pub fn build_request(
        &self,
        role: &str,
        context: &ComposedContext,
        history: &[Message],
        query: &str,
    ) -> ProviderRequest {
        let mut messages = vec![Message::system(format!(
            "{}\n\n{}",
            system_prompt(role),
            context_block(context)
        ))];

        // A turn is one user message and its answer.
        let exchanged: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();
        let start = exchanged.len().saturating_sub(self.history_turns * 2);
        messages.extend(exchanged[start..].iter().map(|m| (*m).clone()));
        messages.push(Message::user(query));

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stop: vec![],
        }
    }

    pub async fn generate(
        &self,
        role: &str,
        context: &ComposedContext,
        history: &[Message],
        query: &str,
    ) -> Result<GeneratedAnswer, ChatError> {
        let request = self.build_request(role, context, history, query);
        let cited_sources = context.source_labels();

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "Completion failed");
                return Err(ChatError::upstream(e.to_string()));
            }
            Err(_) => {
                warn!(provider = self.provider.name(), timeout_ms = self.timeout.as_millis() as u64, "Completion timed out");
                return Err(ChatError::upstream(format!(
                    "completion timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        info!(
            model = %response.model,
            cited = cited_sources.len(),
            answer_len = response.message.content.len(),
            "Answer generated"
        );
        Ok(GeneratedAnswer {
            answer: response.message.content,
            cited_sources,
            model: response.model,
            usage: response.usage,
        })
    }
}
