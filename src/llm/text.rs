//! Single-turn text generation with an output character cap.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::LlmConfig;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

const TRUNCATION_MARKER: &str = "\n\n[Output truncated to character limit]";

/// Turns a `(system, user)` prompt pair into capped text.
pub struct TextGenerator {
    provider: Arc<dyn LlmProvider>,
    max_output_chars: usize,
    temperature: f32,
    timeout: Option<Duration>,
}

impl TextGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            max_output_chars: config.max_output_chars,
            temperature: config.temperature,
            timeout: config.timeout,
        }
    }

    /// Generate text. Empty replies are errors; long replies are truncated.
    pub async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let max_tokens = u32::try_from(self.max_output_chars / 4).unwrap_or(u32::MAX);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(max_tokens);

        tracing::info!(model = %self.provider.model_name(), "Making LLM call");

        let response = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.provider.complete(request))
                .await
                .map_err(|_| LlmError::Timeout {
                    provider: self.provider.model_name().to_string(),
                    timeout,
                })??,
            None => self.provider.complete(request).await?,
        };

        if response.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.model_name().to_string(),
            });
        }

        let text = cap_chars(response.content, self.max_output_chars);
        tracing::info!(chars = text.chars().count(), "LLM call successful");
        Ok(text)
    }
}

/// Truncate `text` to `max` characters, appending the truncation marker.
fn cap_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => {
            let mut capped = text[..byte_idx].to_string();
            capped.push_str(TRUNCATION_MARKER);
            capped
        }
        None => text,
    }
}
