use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    AstraVectorStore, InMemoryMemoryStore, InMemoryVectorStore, MemoryStore, VectorStore,
    ZepMemoryStore,
};
use crate::embeddings::{Embedder, UnavailableEmbedder, VoyageEmbedder};
use crate::error::Result;
use crate::llm::{AnswerGenerator, LlmProvider};
use crate::services::ConversationOrchestrator;

/// Wired-up collaborators for one process.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vector_store: Arc<dyn VectorStore>,
    pub memory_store: Arc<dyn MemoryStore>,
    pub embedder: Arc<dyn Embedder>,
    pub orchestrator: ConversationOrchestrator,
}

impl AppState {
    /// Build the remote clients the config has credentials for and fall back
    /// to in-process stores for the rest.
    pub fn from_config(config: Config) -> Result<Self> {
        let vector_store: Arc<dyn VectorStore> = match &config.vector_store {
            Some(store_config) => {
                tracing::info!(
                    collection = %store_config.collection,
                    keyspace = %store_config.keyspace,
                    "Using Astra DB vector store"
                );
                Arc::new(AstraVectorStore::new(store_config)?)
            }
            None => {
                tracing::warn!(
                    "ASTRA_DB_API_ENDPOINT / ASTRA_DB_APPLICATION_TOKEN not set, using an empty in-memory vector store"
                );
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let memory_store: Arc<dyn MemoryStore> = match &config.memory_store {
            Some(store_config) => {
                tracing::info!(base_url = %store_config.base_url, "Using Zep memory store");
                Arc::new(ZepMemoryStore::new(store_config)?)
            }
            None => {
                tracing::warn!("ZEP_API_KEY not set, session memory will not outlive this process");
                Arc::new(InMemoryMemoryStore::new())
            }
        };

        let embedder: Arc<dyn Embedder> = if config.embeddings.api_key.is_some() {
            tracing::info!(model = %config.embeddings.model, "Using Voyage embeddings");
            Arc::new(VoyageEmbedder::new(&config.embeddings)?)
        } else {
            tracing::warn!("VOYAGE_API_KEY not set, document retrieval is disabled");
            Arc::new(UnavailableEmbedder::new(
                "VOYAGE_API_KEY is not set",
                config.embeddings.dimensions,
            ))
        };

        let llm = LlmProvider::new(config.llm.as_ref());
        if !llm.is_available() {
            tracing::warn!("LLM unavailable - answers cannot be generated");
        }

        Ok(Self::with_components(
            config,
            vector_store,
            memory_store,
            embedder,
            Arc::new(llm),
        ))
    }

    pub fn with_components(
        config: Config,
        vector_store: Arc<dyn VectorStore>,
        memory_store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        let orchestrator = ConversationOrchestrator::new(
            embedder.clone(),
            vector_store.clone(),
            memory_store.clone(),
            generator,
            &config.retrieval,
            &config.conversation,
        );

        Self {
            config: Arc::new(config),
            vector_store,
            memory_store,
            embedder,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversationConfig, EmbeddingsConfig, RetrievalConfig};
    use crate::error::RagError;

    fn offline_config() -> Config {
        Config {
            vector_store: None,
            memory_store: None,
            embeddings: EmbeddingsConfig {
                base_url: "https://api.voyageai.com/v1".to_string(),
                api_key: None,
                model: "voyage-multimodal-3".to_string(),
                dimensions: 4,
                timeout_secs: 5,
                max_retries: 0,
                cache_size: 8,
            },
            retrieval: RetrievalConfig::default(),
            conversation: ConversationConfig::default(),
            llm: None,
        }
    }

    #[tokio::test]
    async fn test_offline_config_wires_in_memory_fallbacks() {
        let state = AppState::from_config(offline_config()).unwrap();

        assert_eq!(state.embedder.dimensions(), 4);
        assert!(state.vector_store.health_check().await.unwrap());

        // Retrieval degrades and generation has no backend.
        let err = state.orchestrator.ask("hello", "U1", "S1").await.unwrap_err();
        assert!(matches!(err, RagError::LlmUnavailable(_)));

        // The user message was recorded before generation failed.
        let history = state.orchestrator.sessions().history("S1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
