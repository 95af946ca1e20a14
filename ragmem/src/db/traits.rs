use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    DocumentDescriptor, Message, MessageLookup, SessionRecord, Summary, User, VectorMatch,
};

// ---------------------------------------------------------------------------
// Vector store
// ---------------------------------------------------------------------------

/// Read side of the chunk vector index.
///
/// Implementations report connectivity problems as
/// [`RagError::RetrievalUnavailable`](crate::error::RagError::RetrievalUnavailable).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest neighbours of `vector`, best match first, at most `limit`.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>>;

    /// Every document page present in the index.
    async fn list_all(&self) -> Result<Vec<DocumentDescriptor>>;

    async fn health_check(&self) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// Durable users, sessions and messages.
///
/// Lookups return `Ok(None)` / [`MessageLookup::NotFound`] for unknown keys;
/// errors are reserved for failures of the store itself.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn create_user(&self, user_id: &str) -> Result<User>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Create a session bound to `user_id`.
    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<SessionRecord>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// The last `limit` messages of the session, oldest first.
    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<MessageLookup>;

    /// Append in order. Called once per logical turn; implementations must not
    /// retry internally.
    async fn append_messages(&self, session_id: &str, messages: &[Message]) -> Result<()>;

    async fn get_summary(&self, session_id: &str) -> Result<Summary>;
}
