//! In-process stores for tests and for running without remote services.
//!
//! The vector store is brute-force cosine similarity. The memory store
//! reproduces the hosted store's quirks that matter to session
//! reconciliation, including implicit session creation when messages are
//! appended to an unknown session id.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use nanoid::nanoid;
use serde_json::Value;

use crate::db::traits::{MemoryStore, VectorStore};
use crate::error::Result;
use crate::models::{
    DocumentDescriptor, Message, MessageLookup, SessionRecord, Summary, User, VectorMatch,
};

struct StoredVector {
    id: String,
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, id: impl Into<String>, vector: Vec<f32>, payload: Value) {
        let id = id.into();
        let mut vectors = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        vectors.retain(|stored| stored.id != id);
        vectors.push(StoredVector {
            id,
            vector,
            payload,
        });
    }

    pub fn len(&self) -> usize {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<VectorMatch> = vectors
            .iter()
            .map(|stored| {
                VectorMatch::new(
                    stored.id.clone(),
                    cosine_sim(vector, &stored.vector),
                    stored.payload.clone(),
                )
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn list_all(&self) -> Result<Vec<DocumentDescriptor>> {
        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let descriptors: BTreeSet<(String, u32)> = vectors
            .iter()
            .map(|stored| {
                let chunk = VectorMatch::new(stored.id.clone(), 0.0, stored.payload.clone())
                    .into_chunk();
                (chunk.document_name, chunk.page_number)
            })
            .collect();
        Ok(descriptors
            .into_iter()
            .map(|(document_name, page_number)| DocumentDescriptor {
                document_name,
                page_number,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

struct StoredSession {
    user_id: String,
    messages: Vec<Message>,
    summary: Summary,
}

#[derive(Default)]
pub struct InMemoryMemoryStore {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the summarizer that runs inside a hosted memory store.
    pub fn set_summary(&self, session_id: &str, summary: Summary) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get_mut(session_id) {
            session.summary = summary;
        }
    }

    pub fn user_ids(&self) -> Vec<String> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = users.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Full message log of a session, oldest first.
    pub fn all_messages(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    fn insert_user(&self, user_id: &str) -> User {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        users
            .entry(user_id.to_string())
            .or_insert_with(|| User {
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            })
            .clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn create_user(&self, user_id: &str) -> Result<User> {
        Ok(self.insert_user(user_id))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user_id).cloned())
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                user_id: user_id.to_string(),
                messages: Vec::new(),
                summary: Summary::Absent,
            });
        Ok(SessionRecord {
            session_id: session_id.to_string(),
            user_id: Some(session.user_id.clone()),
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(session_id).map(|session| SessionRecord {
            session_id: session_id.to_string(),
            user_id: Some(session.user_id.clone()),
        }))
    }

    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<MessageLookup> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match sessions.get(session_id) {
            Some(session) => {
                let skip = session.messages.len().saturating_sub(limit);
                MessageLookup::Found(session.messages[skip..].to_vec())
            }
            None => MessageLookup::NotFound,
        })
    }

    async fn append_messages(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let implicit_owner = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let mut implicit_owner = None;
            let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
                let owner = format!("auto_{}", nanoid!());
                implicit_owner = Some(owner.clone());
                StoredSession {
                    user_id: owner,
                    messages: Vec::new(),
                    summary: Summary::Absent,
                }
            });
            session.messages.extend_from_slice(messages);
            implicit_owner
        };

        // Hosted stores auto-create unknown sessions on write, owned by a
        // generated user. Mirrored here so callers can't depend on it silently.
        if let Some(owner) = implicit_owner {
            tracing::debug!(session_id, owner = %owner, "Implicitly created session on append");
            self.insert_user(&owner);
        }
        Ok(())
    }

    async fn get_summary(&self, session_id: &str) -> Result<Summary> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions
            .get(session_id)
            .map(|session| session.summary.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.insert("a", vec![1.0, 0.0], json!({"document_name": "a.pdf", "page_number": 1}));
        store.insert("b", vec![0.0, 1.0], json!({"document_name": "b.pdf", "page_number": 1}));
        store.insert("c", vec![0.7, 0.7], json!({"document_name": "c.pdf", "page_number": 1}));

        let matches = store.query(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn test_list_all_deduplicates_pages() {
        let store = InMemoryVectorStore::new();
        store.insert("1", vec![1.0], json!({"document_name": "menu.pdf", "page_number": 2}));
        store.insert("2", vec![1.0], json!({"document_name": "menu.pdf", "page_number": 1}));
        store.insert("3", vec![1.0], json!({"document_name": "menu.pdf", "page_number": 2}));

        let docs = store.list_all().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page_number, 1);
        assert_eq!(docs[1].page_number, 2);
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_id() {
        let store = InMemoryVectorStore::new();
        store.insert("1", vec![1.0], json!({}));
        store.insert("1", vec![0.5], json!({}));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_messages_unknown_session_is_not_found() {
        let store = InMemoryMemoryStore::new();
        assert_eq!(
            store.list_messages("missing", 10).await.unwrap(),
            MessageLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_list_messages_returns_tail_oldest_first() {
        let store = InMemoryMemoryStore::new();
        store.create_session("s", "u").await.unwrap();
        let messages: Vec<Message> = (0..5).map(|i| Message::user(format!("m{i}"))).collect();
        store.append_messages("s", &messages).await.unwrap();

        let MessageLookup::Found(tail) = store.list_messages("s", 2).await.unwrap() else {
            panic!("session should exist");
        };
        let contents: Vec<&str> = tail.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_creates_unbound_owner() {
        let store = InMemoryMemoryStore::new();
        store
            .append_messages("orphan", &[Message::user("hi")])
            .await
            .unwrap();

        let session = store.get_session("orphan").await.unwrap().unwrap();
        let owner = session.user_id.unwrap();
        assert!(owner.starts_with("auto_"));
        assert_eq!(store.user_ids(), vec![owner]);
    }

    #[tokio::test]
    async fn test_create_session_keeps_original_owner() {
        let store = InMemoryMemoryStore::new();
        store.create_session("s", "u1").await.unwrap();
        let again = store.create_session("s", "u2").await.unwrap();
        assert_eq!(again.user_id.as_deref(), Some("u1"));
    }
}
