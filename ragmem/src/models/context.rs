use serde::{Deserialize, Serialize};

use super::{Chunk, Message, Summary};

/// Prompt-ready bundle handed to the answer generator. Built per turn and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub query: String,
    pub summary: Summary,
    /// Bounded history, oldest first.
    pub recent_messages: Vec<Message>,
    pub chunks: Vec<Chunk>,
    pub is_new_session: bool,
    /// Retrieval failed and the context carries no document chunks.
    pub retrieval_degraded: bool,
    /// Session memory could not be loaded and the context carries no history.
    pub memory_degraded: bool,
}

impl ConversationContext {
    pub fn has_documents(&self) -> bool {
        !self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AskMetadata {
    pub session_id: String,
    pub user_id: String,
    pub is_new_session: bool,
    pub chunks_used: usize,
    pub history_messages: usize,
    pub retrieval_degraded: bool,
    pub memory_degraded: bool,
    pub user_turn_saved: bool,
    pub assistant_turn_saved: bool,
    /// Non-fatal problems hit while recording the turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub metadata: AskMetadata,
}
