//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{Chat, CompletionModel, Message, Prompt, PromptError};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Adapter that runs each request through a one-shot rig agent.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = AgentBuilder::new(self.model.clone());
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(&preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        let agent = builder.build();

        // Last user turn is the prompt; earlier turns become history.
        let mut turns: Vec<Message> = request
            .messages
            .iter()
            .filter_map(|m| match m.role {
                Role::System => None,
                Role::User => Some(Message::user(m.content.clone())),
                Role::Assistant => Some(Message::assistant(m.content.clone())),
            })
            .collect();
        let prompt = turns.pop().ok_or_else(|| LlmError::RequestFailed {
            provider: self.provider.to_string(),
            reason: "completion request has no user message".to_string(),
        })?;

        tracing::debug!(model = %self.model_name, history = turns.len(), "Sending completion request");

        let result = if turns.is_empty() {
            agent.prompt(prompt).await
        } else {
            agent.chat(prompt, turns).await
        };

        let content = result.map_err(|e| map_prompt_error(self.provider, e))?;
        Ok(CompletionResponse { content })
    }
}

/// Classify a rig error into a sanitized `LlmError`.
fn map_prompt_error(provider: &str, err: PromptError) -> LlmError {
    let detail = err.to_string();
    tracing::error!(provider, error = %detail, "LLM request failed");
    classify_failure(provider, &detail)
}

fn classify_failure(provider: &str, detail: &str) -> LlmError {
    let lower = detail.to_lowercase();
    let provider = provider.to_string();
    if lower.contains("authentication") || lower.contains("unauthorized") || lower.contains("401")
    {
        LlmError::AuthFailed { provider }
    } else if lower.contains("rate limit") || lower.contains("429") {
        LlmError::RateLimited { provider }
    } else if lower.contains("connect") || lower.contains("dns") {
        LlmError::RequestFailed {
            provider,
            reason: "Failed to connect to the API. Please check your internet connection."
                .to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider,
            reason: "API error occurred. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_failures() {
        let err = classify_failure("anthropic", "ProviderError: 401 Unauthorized");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn classifies_rate_limits() {
        let err = classify_failure("anthropic", "HTTP 429: rate limit exceeded");
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[test]
    fn other_failures_do_not_leak_detail() {
        let err = classify_failure("anthropic", "secret-key sk-ant-123 rejected by upstream");
        let text = err.to_string();
        assert!(!text.contains("sk-ant"));
        assert!(text.contains("anthropic"));
    }
}
