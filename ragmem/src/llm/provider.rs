use async_trait::async_trait;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{RagError, Result};
use crate::llm::api::LlmApiClient;
use crate::llm::prompts::{rag_answer_prompt, ANSWER_SYSTEM_PROMPT};
use crate::models::ConversationContext;

/// Produces the assistant reply for a fully assembled conversation context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, context: &ConversationContext) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    client: Option<LlmApiClient>,
    options: CompletionOptions,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided (set LLM_MODEL)");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            _ => match &config.base_url {
                Some(base_url) => LlmBackend::OpenAICompatible {
                    base_url: base_url.clone(),
                },
                None if config.api_key.is_some() => LlmBackend::OpenAI,
                None => LlmBackend::Unavailable {
                    reason: format!("Unknown provider in model: {}", config.model),
                },
            },
        };

        if let LlmBackend::Unavailable { reason } = &backend {
            return Self::unavailable(reason);
        }

        let client = match LlmApiClient::new(config) {
            Ok(client) => client,
            Err(e) => return Self::unavailable(&e.to_string()),
        };

        tracing::info!(model = %client.model(), backend = ?backend, "LLM provider configured");

        Self {
            backend,
            client: Some(client),
            options: CompletionOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            client: None,
            options: CompletionOptions::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    fn client(&self) -> Result<&LlmApiClient> {
        self.client.as_ref().ok_or_else(|| {
            let reason = match &self.backend {
                LlmBackend::Unavailable { reason } => reason.clone(),
                _ => "LLM client not initialized".to_string(),
            };
            RagError::LlmUnavailable(reason)
        })
    }
}

#[async_trait]
impl AnswerGenerator for LlmProvider {
    async fn generate(&self, context: &ConversationContext) -> Result<String> {
        let client = self.client()?;
        let prompt = rag_answer_prompt(context);
        client
            .chat(
                Some(ANSWER_SYSTEM_PROMPT),
                &context.recent_messages,
                &prompt,
                Some(&self.options),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str, api_key: Option<&str>, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            base_url: base_url.map(str::to_string),
            timeout_secs: 5,
            max_retries: 0,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_missing_config_is_unavailable() {
        let provider = LlmProvider::new(None);
        assert!(!provider.is_available());
        assert!(matches!(provider.backend(), LlmBackend::Unavailable { .. }));
    }

    #[test]
    fn test_backend_from_prefix() {
        let provider = LlmProvider::new(Some(&config("ollama/llama3", None, None)));
        assert_eq!(provider.backend(), &LlmBackend::Ollama);
        assert!(provider.is_available());

        let provider = LlmProvider::new(Some(&config(
            "my-model",
            None,
            Some("http://localhost:8080/v1"),
        )));
        assert_eq!(
            provider.backend(),
            &LlmBackend::OpenAICompatible {
                base_url: "http://localhost:8080/v1".to_string()
            }
        );
    }

    #[test]
    fn test_hosted_provider_without_key_is_unavailable() {
        let provider = LlmProvider::new(Some(&config("openai/gpt-4o-mini", None, None)));
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_generate_fails_fast_when_unavailable() {
        let provider = LlmProvider::unavailable("offline");
        let err = provider
            .generate(&ConversationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::LlmUnavailable(reason) if reason == "offline"));
    }
}
