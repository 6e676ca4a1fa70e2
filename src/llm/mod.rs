//! LLM integration for Agent Ops.
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait. `TextGenerator`
//! sits on top and applies the output cap and sampling defaults used by every
//! report template.

pub mod provider;
mod rig_adapter;
mod text;

pub use provider::*;
pub use rig_adapter::RigAdapter;
pub use text::TextGenerator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` leaves the service running; every generation then fails.
    pub api_key: Option<SecretString>,
    pub model: String,
    /// Hard cap on returned characters. Also drives `max_tokens` (chars / 4).
    pub max_output_chars: usize,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-5-sonnet-latest".to_string(),
            max_output_chars: 9000,
            temperature: 0.1,
            timeout: None,
        }
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let Some(api_key) = &config.api_key else {
        tracing::warn!("ANTHROPIC_API_KEY not set, content generation will fail");
        return Ok(Arc::new(UnconfiguredProvider {
            model: config.model.clone(),
        }));
    };
    create_anthropic_provider(api_key, &config.model)
}

fn create_anthropic_provider(
    api_key: &SecretString,
    model_name: &str,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key.expose_secret()).map_err(|e| LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: format!("Failed to create Anthropic client: {}", e),
        })?;

    let model = client.completion_model(model_name);
    tracing::info!("Using Anthropic (model: {})", model_name);
    Ok(Arc::new(RigAdapter::new(model, model_name, "anthropic")))
}

/// Stand-in used when no API key is configured.
struct UnconfiguredProvider {
    model: String,
}

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::NotConfigured {
            provider: "anthropic".to_string(),
            reason: "ANTHROPIC_API_KEY environment variable not set".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_with_key_constructs() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let config = LlmConfig {
            api_key: Some(SecretString::from("test-key")),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-latest");
    }

    #[tokio::test]
    async fn test_missing_key_fails_per_request() {
        let provider = create_provider(&LlmConfig::default()).unwrap();
        let err = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { .. }));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
