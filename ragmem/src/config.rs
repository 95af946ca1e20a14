use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vector_store: Option<VectorStoreConfig>,
    pub memory_store: Option<MemoryStoreConfig>,
    pub embeddings: EmbeddingsConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub llm: Option<LlmConfig>,
}

/// Astra DB Data API collection holding the chunk vectors.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreConfig {
    pub api_endpoint: String,
    pub token: String,
    pub keyspace: String,
    pub collection: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub page_size: usize,
}

/// Zep memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    /// Matches scoring below this are dropped. `None` keeps everything.
    pub min_similarity: Option<f32>,
    pub display_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    pub history_limit: usize,
    pub degrade_on_retrieval_failure: bool,
    pub degrade_on_memory_failure: bool,
    pub serialize_sessions: bool,
}

/// LLM configuration for the answer generator
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 3,
            min_similarity: None,
            display_length: 200,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            degrade_on_retrieval_failure: true,
            degrade_on_memory_failure: true,
            serialize_sessions: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let vector_store = match (
            non_empty_env("ASTRA_DB_API_ENDPOINT"),
            non_empty_env("ASTRA_DB_APPLICATION_TOKEN"),
        ) {
            (Some(api_endpoint), Some(token)) => Some(VectorStoreConfig {
                api_endpoint,
                token,
                keyspace: env::var("ASTRA_DB_KEYSPACE")
                    .unwrap_or_else(|_| "default_keyspace".to_string()),
                collection: env::var("ASTRA_DB_COLLECTION")
                    .unwrap_or_else(|_| "agenciawow".to_string()),
                timeout_secs: parse_env_or("ASTRA_DB_TIMEOUT", 30),
                max_retries: parse_env_or("ASTRA_DB_MAX_RETRIES", 2),
                page_size: parse_env_or("ASTRA_DB_PAGE_SIZE", 20),
            }),
            _ => None,
        };

        let memory_store = non_empty_env("ZEP_API_KEY").map(|api_key| MemoryStoreConfig {
            base_url: env::var("ZEP_BASE_URL")
                .unwrap_or_else(|_| "https://api.getzep.com/api/v2".to_string()),
            api_key,
            timeout_secs: parse_env_or("ZEP_TIMEOUT", 30),
        });

        let retrieval_defaults = RetrievalConfig::default();
        let conversation_defaults = ConversationConfig::default();

        Self {
            vector_store,
            memory_store,
            embeddings: EmbeddingsConfig {
                base_url: env::var("VOYAGE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.voyageai.com/v1".to_string()),
                api_key: non_empty_env("VOYAGE_API_KEY"),
                model: env::var("VOYAGE_MODEL")
                    .unwrap_or_else(|_| "voyage-multimodal-3".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1024),
                timeout_secs: parse_env_or("VOYAGE_TIMEOUT", 30),
                max_retries: parse_env_or("VOYAGE_MAX_RETRIES", 3),
                cache_size: parse_env_or("EMBEDDING_CACHE_SIZE", 256),
            },
            retrieval: RetrievalConfig {
                default_limit: parse_env_or("SEARCH_LIMIT", retrieval_defaults.default_limit),
                min_similarity: parse_env_opt("MIN_SIMILARITY"),
                display_length: parse_env_or("DISPLAY_LENGTH", retrieval_defaults.display_length),
            },
            conversation: ConversationConfig {
                history_limit: parse_env_or("HISTORY_LIMIT", conversation_defaults.history_limit),
                degrade_on_retrieval_failure: parse_env_or(
                    "DEGRADE_ON_RETRIEVAL_FAILURE",
                    conversation_defaults.degrade_on_retrieval_failure,
                ),
                degrade_on_memory_failure: parse_env_or(
                    "DEGRADE_ON_MEMORY_FAILURE",
                    conversation_defaults.degrade_on_memory_failure,
                ),
                serialize_sessions: parse_env_or(
                    "SERIALIZE_SESSIONS",
                    conversation_defaults.serialize_sessions,
                ),
            },
            llm: non_empty_env("LLM_MODEL").map(|model| LlmConfig {
                model,
                api_key: non_empty_env("LLM_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY")),
                base_url: non_empty_env("LLM_BASE_URL"),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                temperature: parse_env_opt("LLM_TEMPERATURE"),
                max_tokens: parse_env_opt("LLM_MAX_TOKENS"),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}
