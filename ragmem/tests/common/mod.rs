#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use ragmem::config::{ConversationConfig, RetrievalConfig};
use ragmem::db::{InMemoryMemoryStore, InMemoryVectorStore, MemoryStore, VectorStore};
use ragmem::embeddings::Embedder;
use ragmem::error::{RagError, Result};
use ragmem::llm::AnswerGenerator;
use ragmem::models::{
    ConversationContext, DocumentDescriptor, Message, MessageLookup, Role, SessionRecord, Summary,
    User, VectorMatch,
};
use ragmem::services::ConversationOrchestrator;

pub const DIMENSIONS: usize = 3;

/// Embedder with a fixed vocabulary. Unknown text maps to `default`.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            default: vec![1.0, 0.0, 0.0],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Generator that records every context it receives.
#[derive(Default)]
pub struct CapturingGenerator {
    pub contexts: Mutex<Vec<ConversationContext>>,
    pub fail: AtomicBool,
}

impl CapturingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let generator = Self::default();
        generator.fail.store(true, Ordering::SeqCst);
        generator
    }

    pub fn last(&self) -> ConversationContext {
        self.contexts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("generator was never called")
    }

    pub fn call_count(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnswerGenerator for CapturingGenerator {
    async fn generate(&self, context: &ConversationContext) -> Result<String> {
        self.contexts.lock().unwrap().push(context.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Llm("generator offline".to_string()));
        }

        let remembered: Vec<&str> = context
            .recent_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        Ok(format!(
            "reply to '{}' (history: {})",
            context.query,
            remembered.join(" | ")
        ))
    }
}

/// Vector store that always fails, counting calls.
#[derive(Default)]
pub struct FailingVectorStore {
    pub calls: AtomicUsize,
}

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn query(&self, _vector: &[f32], _limit: usize) -> Result<Vec<VectorMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::RetrievalUnavailable("connection refused".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<DocumentDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::RetrievalUnavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }
}

/// In-memory memory store with switchable faults.
#[derive(Default)]
pub struct FaultyMemoryStore {
    pub inner: InMemoryMemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_user_append: AtomicBool,
    pub fail_assistant_append: AtomicBool,
    pub fail_summary: AtomicBool,
    pub append_calls: AtomicUsize,
}

impl FaultyMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RagError::MemoryUnavailable("memory store timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FaultyMemoryStore {
    async fn create_user(&self, user_id: &str) -> Result<User> {
        self.check_reads()?;
        self.inner.create_user(user_id).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.check_reads()?;
        self.inner.get_user(user_id).await
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<SessionRecord> {
        self.check_reads()?;
        self.inner.create_session(session_id, user_id).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.check_reads()?;
        self.inner.get_session(session_id).await
    }

    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<MessageLookup> {
        self.check_reads()?;
        self.inner.list_messages(session_id, limit).await
    }

    async fn append_messages(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let role = messages.first().map(|m| m.role);
        let fail = match role {
            Some(Role::User) => self.fail_user_append.load(Ordering::SeqCst),
            Some(Role::Assistant) => self.fail_assistant_append.load(Ordering::SeqCst),
            None => false,
        };
        if fail {
            return Err(RagError::MemoryAppend {
                session_id: session_id.to_string(),
                reason: "write rejected".to_string(),
            });
        }
        self.inner.append_messages(session_id, messages).await
    }

    async fn get_summary(&self, session_id: &str) -> Result<Summary> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(RagError::MemoryUnavailable("summary not ready".to_string()));
        }
        self.inner.get_summary(session_id).await
    }
}

/// Vector store seeded with three menu pages.
pub fn seeded_vector_store() -> Arc<InMemoryVectorStore> {
    let store = InMemoryVectorStore::new();
    store.insert(
        "menu_p1",
        vec![1.0, 0.0, 0.0],
        json!({
            "document_name": "menu.pdf",
            "page_number": 1,
            "content": r#"{"markdown": "**Classic Burger** with cheddar"}"#,
            "image_url": "https://assets.example.com/menu_p1.png"
        }),
    );
    store.insert(
        "menu_p2",
        vec![0.0, 1.0, 0.0],
        json!({
            "document_name": "menu.pdf",
            "page_number": 2,
            "content": "Veggie burger and fries"
        }),
    );
    store.insert(
        "hours_p1",
        vec![0.0, 0.0, 1.0],
        json!({
            "document_name": "hours.pdf",
            "page_number": 1,
            "content": "Open daily from 11am"
        }),
    );
    Arc::new(store)
}

pub fn orchestrator(
    vector_store: Arc<dyn VectorStore>,
    memory_store: Arc<dyn MemoryStore>,
    generator: Arc<dyn AnswerGenerator>,
    conversation: ConversationConfig,
) -> ConversationOrchestrator {
    ConversationOrchestrator::new(
        Arc::new(FixedEmbedder::new()),
        vector_store,
        memory_store,
        generator,
        &RetrievalConfig::default(),
        &conversation,
    )
}

pub fn role_counts(messages: &[Message]) -> (usize, usize) {
    let users = messages.iter().filter(|m| m.role == Role::User).count();
    (users, messages.len() - users)
}

/// OpenAI-style chat completion response body.
pub fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "finish_reason": "stop"
            }
        ],
        "usage": {
            "prompt_tokens": 1,
            "completion_tokens": 1,
            "total_tokens": 2
        }
    })
}
