//! Reconciliation of users and sessions against the memory store.
//!
//! A session is only ever created explicitly and bound to the requesting
//! user. Stores that auto-create sessions on write would otherwise attach the
//! first append to a generated user.

use std::sync::Arc;

use crate::db::MemoryStore;
use crate::error::{RagError, Result};
use crate::models::{Message, MessageLookup, SessionContext, Summary, User};

#[derive(Clone)]
pub struct SessionContextManager {
    store: Arc<dyn MemoryStore>,
    history_limit: usize,
}

impl SessionContextManager {
    pub fn new(store: Arc<dyn MemoryStore>, history_limit: usize) -> Self {
        Self {
            store,
            history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Look the user up, creating it when missing. Safe to call repeatedly.
    pub async fn ensure_user(&self, user_id: &str) -> Result<User> {
        validate_id("user_id", user_id)?;

        if let Some(user) = self.store.get_user(user_id).await? {
            return Ok(user);
        }

        let user = self.store.create_user(user_id).await?;
        tracing::info!(user_id, "Created user");
        Ok(user)
    }

    /// Bring the session to a loaded state for `user_id` and return its
    /// summary and bounded history.
    pub async fn ensure_session_context(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<SessionContext> {
        validate_id("session_id", session_id)?;
        self.ensure_user(user_id).await?;

        let (messages, is_new_session) =
            match self.store.list_messages(session_id, self.history_limit).await? {
                MessageLookup::NotFound => {
                    let created = self.store.create_session(session_id, user_id).await?;
                    // Creation is idempotent in the store, so a concurrent
                    // creator may have won with a different owner.
                    check_owner(session_id, created.user_id.as_deref(), user_id)?;
                    tracing::info!(session_id, user_id, "Created session");
                    (Vec::new(), true)
                }
                MessageLookup::Found(messages) => {
                    self.verify_ownership(session_id, user_id).await?;
                    (messages, false)
                }
            };

        let summary = match self.store.get_summary(session_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Failed to load session summary");
                Summary::Absent
            }
        };

        tracing::debug!(
            session_id,
            history = messages.len(),
            is_new_session,
            has_summary = !summary.is_absent(),
            "Session context loaded"
        );

        Ok(SessionContext {
            summary,
            messages,
            is_new_session,
        })
    }

    /// Record messages for one turn. Exactly one store call; never retried.
    pub async fn append_turn(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        self.store
            .append_messages(session_id, messages)
            .await
            .map_err(|e| match e {
                RagError::MemoryAppend { .. } => e,
                other => RagError::MemoryAppend {
                    session_id: session_id.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Stored messages without creating anything. Unknown sessions read as empty.
    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        validate_id("session_id", session_id)?;
        match self.store.list_messages(session_id, limit).await? {
            MessageLookup::Found(messages) => Ok(messages),
            MessageLookup::NotFound => Ok(Vec::new()),
        }
    }

    async fn verify_ownership(&self, session_id: &str, user_id: &str) -> Result<()> {
        let record = self.store.get_session(session_id).await?;
        let owner = record.as_ref().and_then(|r| r.user_id.as_deref());
        check_owner(session_id, owner, user_id)
    }
}

fn check_owner(session_id: &str, owner: Option<&str>, requested: &str) -> Result<()> {
    match owner {
        Some(owner) if owner != requested => Err(RagError::SessionOwnershipConflict {
            session_id: session_id.to_string(),
            owner: owner.to_string(),
            requested: requested.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            tracing::warn!(session_id, requested, "Session has no owner on record");
            Ok(())
        }
    }
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RagError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
