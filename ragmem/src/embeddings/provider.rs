use async_trait::async_trait;

use super::api::{ApiConfig, VoyageApiClient};
use super::cache::QueryEmbeddingCache;
use crate::config::EmbeddingsConfig;
use crate::error::{RagError, Result};

/// Turns query text into a vector in the same space as the indexed chunks.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality every returned vector has.
    fn dimensions(&self) -> usize;
}

/// Voyage multimodal embedder with an LRU cache in front of the API.
#[derive(Clone)]
pub struct VoyageEmbedder {
    client: VoyageApiClient,
    cache: QueryEmbeddingCache,
    dimensions: usize,
}

impl VoyageEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(RagError::Config(
                "VOYAGE_API_KEY is required for query embeddings".to_string(),
            ));
        }

        Ok(Self {
            client: VoyageApiClient::new(ApiConfig::from(config))?,
            cache: QueryEmbeddingCache::new(config.cache_size),
            dimensions: config.dimensions,
        })
    }

    pub fn cache(&self) -> &QueryEmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let query = text.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("Query text is empty".to_string()));
        }

        let key = self.cache.generate_key(self.client.model(), query);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Query embedding cache hit");
            return Ok(cached);
        }

        let embedding = self
            .client
            .embed_queries(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding generated".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(RagError::Embedding(format!(
                "Model returned {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }

        self.cache.put(key, embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Stand-in used when no embedding credentials are configured. Every call
/// fails with an embedding error, which the orchestrator may degrade.
#[derive(Debug, Clone)]
pub struct UnavailableEmbedder {
    reason: String,
    dimensions: usize,
}

impl UnavailableEmbedder {
    pub fn new(reason: impl Into<String>, dimensions: usize) -> Self {
        Self {
            reason: reason.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding(self.reason.clone()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> EmbeddingsConfig {
        EmbeddingsConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: api_key.map(str::to_string),
            model: "voyage-multimodal-3".to_string(),
            dimensions: 3,
            timeout_secs: 1,
            max_retries: 0,
            cache_size: 4,
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            VoyageEmbedder::new(&config(None)),
            Err(RagError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_query_rejected_before_request() {
        let embedder = VoyageEmbedder::new(&config(Some("key"))).unwrap();
        let err = embedder.embed("   ").await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cached_vector_served_without_request() {
        let embedder = VoyageEmbedder::new(&config(Some("key"))).unwrap();
        let key = embedder
            .cache()
            .generate_key("voyage-multimodal-3", "cardapio");
        embedder.cache().put(key, vec![1.0, 0.0, 0.0]);

        // Base URL is unroutable, so a request would fail.
        assert_eq!(embedder.embed(" cardapio ").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_unavailable_embedder_errors_are_degradable() {
        let embedder = UnavailableEmbedder::new("no key", 1024);
        assert_eq!(embedder.dimensions(), 1024);
        let err = embedder.embed("hi").await.unwrap_err();
        assert!(err.is_degradable_retrieval());
    }
}
