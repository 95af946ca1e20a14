use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error(
        "Session '{session_id}' belongs to user '{owner}', refusing to bind it to user '{requested}'"
    )]
    SessionOwnershipConflict {
        session_id: String,
        owner: String,
        requested: String,
    },

    #[error("Failed to append messages to session '{session_id}': {reason}")]
    MemoryAppend { session_id: String, reason: String },

    #[error("Memory store unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl RagError {
    /// Whether a failure on the retrieval path may be replaced by an empty
    /// chunk set when the orchestrator runs in degrade mode.
    pub fn is_degradable_retrieval(&self) -> bool {
        matches!(
            self,
            RagError::RetrievalUnavailable(_)
                | RagError::Embedding(_)
                | RagError::ApiRateLimit { .. }
                | RagError::ApiAuth(_)
                | RagError::Http(_)
        )
    }

    /// Whether a failure while loading session context may be replaced by an
    /// empty history. Ownership conflicts and bad input never qualify.
    pub fn is_degradable_memory(&self) -> bool {
        matches!(
            self,
            RagError::MemoryUnavailable(_) | RagError::ApiAuth(_) | RagError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
