use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{ConversationConfig, RetrievalConfig};
use crate::db::{MemoryStore, VectorStore};
use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::llm::AnswerGenerator;
use crate::models::{
    AskMetadata, AskResponse, ConversationContext, Message, SearchResult, SessionContext,
};
use crate::services::{Retriever, SessionContextManager};

/// Per-session async locks so turns on one session run one at a time.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs one conversational turn: retrieval and session memory in parallel,
/// then generation, then the turn is recorded.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    sessions: SessionContextManager,
    generator: Arc<dyn AnswerGenerator>,
    default_limit: usize,
    degrade_on_retrieval_failure: bool,
    degrade_on_memory_failure: bool,
    locks: Option<SessionLocks>,
}

impl ConversationOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        memory_store: Arc<dyn MemoryStore>,
        generator: Arc<dyn AnswerGenerator>,
        retrieval: &RetrievalConfig,
        conversation: &ConversationConfig,
    ) -> Self {
        let retriever = Retriever::new(vector_store, embedder.dimensions(), retrieval);
        let sessions = SessionContextManager::new(memory_store, conversation.history_limit);

        Self {
            embedder,
            retriever,
            sessions,
            generator,
            default_limit: retrieval.default_limit,
            degrade_on_retrieval_failure: conversation.degrade_on_retrieval_failure,
            degrade_on_memory_failure: conversation.degrade_on_memory_failure,
            locks: conversation.serialize_sessions.then(SessionLocks::new),
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn sessions(&self) -> &SessionContextManager {
        &self.sessions
    }

    pub async fn search(&self, query_text: &str) -> Result<SearchResult> {
        self.search_with_limit(query_text, self.default_limit).await
    }

    pub async fn search_with_limit(&self, query_text: &str, limit: usize) -> Result<SearchResult> {
        require_non_empty("query", query_text)?;
        let embedding = self.embedder.embed(query_text).await?;
        self.retriever.search(query_text, &embedding, limit).await
    }

    /// Assemble everything the generator needs for `query`.
    ///
    /// Retrieval and session loading run concurrently. Their failures are
    /// replaced by empty content when the matching degrade policy is on;
    /// ownership conflicts and invalid input always fail.
    pub async fn build_context(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ConversationContext> {
        require_non_empty("message", query)?;
        require_non_empty("user_id", user_id)?;
        require_non_empty("session_id", session_id)?;

        let retrieval = async {
            let embedding = self.embedder.embed(query).await?;
            self.retriever
                .search(query, &embedding, self.default_limit)
                .await
        };
        let session = self.sessions.ensure_session_context(session_id, user_id);

        let (retrieval, session) = tokio::join!(retrieval, session);

        let (chunks, retrieval_degraded) = match retrieval {
            Ok(result) => (result.chunks, false),
            Err(e) if self.degrade_on_retrieval_failure && e.is_degradable_retrieval() => {
                tracing::warn!(session_id, error = %e, "Retrieval failed, continuing without documents");
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        };

        let (session, memory_degraded) = match session {
            Ok(session) => (session, false),
            Err(e) if self.degrade_on_memory_failure && e.is_degradable_memory() => {
                tracing::warn!(session_id, error = %e, "Session memory unavailable, continuing without history");
                (SessionContext::default(), true)
            }
            Err(e) => return Err(e),
        };

        Ok(ConversationContext {
            query: query.to_string(),
            summary: session.summary,
            recent_messages: session.messages,
            chunks,
            is_new_session: session.is_new_session,
            retrieval_degraded,
            memory_degraded,
        })
    }

    /// One full turn. The user message is recorded before generation and the
    /// reply only after the user message was stored.
    pub async fn ask(&self, message: &str, user_id: &str, session_id: &str) -> Result<AskResponse> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(session_id).await),
            None => None,
        };

        let context = self.build_context(message, user_id, session_id).await?;

        let mut metadata = AskMetadata {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            is_new_session: context.is_new_session,
            chunks_used: context.chunks.len(),
            history_messages: context.recent_messages.len(),
            retrieval_degraded: context.retrieval_degraded,
            memory_degraded: context.memory_degraded,
            ..Default::default()
        };

        if context.memory_degraded {
            metadata
                .warnings
                .push("Session memory unavailable; this turn was not recorded".to_string());
        } else {
            match self
                .sessions
                .append_turn(session_id, &[Message::user(message)])
                .await
            {
                Ok(()) => metadata.user_turn_saved = true,
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Failed to record user message");
                    metadata.warnings.push(e.to_string());
                }
            }
        }

        let answer = self.generator.generate(&context).await?;

        if metadata.user_turn_saved {
            match self
                .sessions
                .append_turn(session_id, &[Message::assistant(answer.as_str())])
                .await
            {
                Ok(()) => metadata.assistant_turn_saved = true,
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Failed to record assistant reply");
                    metadata.warnings.push(e.to_string());
                }
            }
        }

        tracing::info!(
            session_id,
            user_id,
            chunks = metadata.chunks_used,
            history = metadata.history_messages,
            recorded = metadata.assistant_turn_saved,
            "Turn complete"
        );

        Ok(AskResponse { answer, metadata })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RagError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
