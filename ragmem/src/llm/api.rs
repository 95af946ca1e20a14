use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use reqwest::StatusCode;

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{RagError, Result},
    llm::provider::CompletionOptions,
    models::{Message, Role},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(RagError::Config(
                "API key required for this LLM provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| RagError::Llm(format!("Failed to create LLM HTTP client: {error}")))?;

        // async-openai retries internally with its own backoff; cap it at the
        // request timeout so it cannot outlive our retry loop.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Single chat completion: system prompt, prior turns, then `prompt` as
    /// the final user message.
    pub async fn chat(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(RagError::InvalidInput("Prompt cannot be empty".to_string()));
        }

        let mut last_error: Option<RagError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = self.build_request(system_prompt, history, prompt, options)?;

            match self.client.chat().create(request).await {
                Ok(response) => return Self::extract_content(response),
                Err(error) => match classify(error) {
                    Failure::Transient(err) if attempt < self.config.max_retries => {
                        tracing::debug!(attempt, error = %err, "Retrying LLM completion");
                        last_error = Some(err);
                    }
                    Failure::Transient(err) | Failure::Fatal(err) => return Err(err),
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| RagError::Llm("LLM completion failed after retries".to_string())))
    }

    fn build_request(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|error| {
                        RagError::InvalidInput(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        for message in history {
            messages.push(Self::history_message(message)?);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|error| RagError::InvalidInput(format!("Invalid user prompt: {error}")))?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);
        Self::apply_completion_options(&mut request, options);

        request.build().map_err(|error| {
            RagError::InvalidInput(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn history_message(message: &Message) -> Result<ChatCompletionRequestMessage> {
        let converted = match message.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(Into::into),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(Into::into),
        };
        converted.map_err(|error| RagError::InvalidInput(format!("Invalid history message: {error}")))
    }

    fn apply_completion_options(
        request: &mut CreateChatCompletionRequestArgs,
        options: Option<&CompletionOptions>,
    ) {
        let Some(options) = options else {
            return;
        };

        if let Some(temperature) = options.temperature {
            request.temperature(temperature);
        }

        if let Some(max_tokens) = options.max_tokens {
            request.max_tokens(max_tokens);
        }
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Llm("LLM response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(RagError::Llm(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(message)
    }
}

/// How a failed completion attempt is handled.
enum Failure {
    Fatal(RagError),
    Transient(RagError),
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "insufficient_quota",
];
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid api key",
    "invalid_api_key",
];

fn classify(error: OpenAIError) -> Failure {
    match error {
        OpenAIError::Reqwest(err) => match err.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                Failure::Fatal(RagError::LlmRateLimit { retry_after: None })
            }
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Failure::Fatal(
                RagError::ApiAuth(format!("LLM authentication failed: {err}")),
            ),
            Some(status) if !status.is_server_error() => {
                Failure::Fatal(RagError::Llm(format!("LLM request failed: {err}")))
            }
            _ => Failure::Transient(RagError::Llm(format!("LLM request failed: {err}"))),
        },
        OpenAIError::ApiError(api_error) => classify_api_error(&api_error),
        OpenAIError::JSONDeserialize(err) => {
            Failure::Fatal(RagError::Llm(format!("Failed to parse LLM response: {err}")))
        }
        OpenAIError::InvalidArgument(message) => Failure::Fatal(RagError::InvalidInput(message)),
        other => Failure::Fatal(RagError::Llm(other.to_string())),
    }
}

fn classify_api_error(api_error: &ApiError) -> Failure {
    let haystack = format!(
        "{} {} {}",
        api_error.message,
        api_error.r#type.as_deref().unwrap_or_default(),
        api_error.code.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| haystack.contains(m));

    if mentions(RATE_LIMIT_MARKERS) {
        Failure::Fatal(RagError::LlmRateLimit { retry_after: None })
    } else if mentions(AUTH_MARKERS) {
        Failure::Fatal(RagError::ApiAuth(format!(
            "LLM authentication failed: {api_error}"
        )))
    } else if api_error.r#type.is_none() && api_error.code.is_none() {
        // No type or code: treat as a transient gateway failure.
        Failure::Transient(RagError::Llm(format!("LLM API error: {api_error}")))
    } else {
        Failure::Fatal(RagError::Llm(format!("LLM API error: {api_error}")))
    }
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}
