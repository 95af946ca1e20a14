use std::sync::Arc;

use serde_json::Value;

use crate::config::RetrievalConfig;
use crate::db::VectorStore;
use crate::error::{RagError, Result};
use crate::models::{Chunk, DocumentDescriptor, SearchResult};

/// Extract the `markdown` field from a JSON-encoded chunk body.
///
/// Anything that is not a JSON object with a string `markdown` field is
/// returned unchanged.
pub fn unwrap_content(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(envelope)) => match envelope.get("markdown") {
            Some(Value::String(markdown)) => markdown.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Unwrapped content cut to at most `max_chars` characters. Never fails.
pub fn display_content(raw: &str, max_chars: usize) -> String {
    unwrap_content(raw).chars().take(max_chars).collect()
}

/// Similarity search over the chunk index.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    min_similarity: Option<f32>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, dimensions: usize, config: &RetrievalConfig) -> Self {
        Self {
            store,
            dimensions,
            min_similarity: config.min_similarity,
        }
    }

    /// Top `limit` chunks for an embedded query, best first.
    ///
    /// Input is validated before the store is touched. Store failures come
    /// back as [`RagError::RetrievalUnavailable`]; no retry happens here.
    pub async fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<SearchResult> {
        if query_embedding.is_empty() {
            return Err(RagError::InvalidInput("Query embedding is empty".to_string()));
        }
        if query_embedding.len() != self.dimensions {
            return Err(RagError::InvalidInput(format!(
                "Query embedding has {} dimensions, expected {}",
                query_embedding.len(),
                self.dimensions
            )));
        }
        if limit == 0 {
            return Err(RagError::InvalidInput("Limit must be at least 1".to_string()));
        }

        let matches = self
            .store
            .query(query_embedding, limit)
            .await
            .map_err(into_retrieval_error)?;

        let mut chunks: Vec<Chunk> = matches
            .into_iter()
            .map(|found| {
                let mut chunk = found.into_chunk();
                chunk.content = unwrap_content(&chunk.content);
                chunk
            })
            .filter(|chunk| {
                self.min_similarity
                    .map_or(true, |floor| chunk.similarity >= floor)
            })
            .collect();

        chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        chunks.truncate(limit);

        tracing::debug!(
            query = %query_text,
            returned = chunks.len(),
            limit,
            "Retrieval complete"
        );

        Ok(SearchResult::found(chunks))
    }

    /// Distinct document pages in the index.
    pub async fn list_documents(&self) -> Result<Vec<DocumentDescriptor>> {
        self.store.list_all().await.map_err(into_retrieval_error)
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }
}

/// Auth problems keep their own variant so callers can tell a bad token from
/// an outage.
fn into_retrieval_error(error: RagError) -> RagError {
    match error {
        RagError::RetrievalUnavailable(_) | RagError::ApiAuth(_) => error,
        other => RagError::RetrievalUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_markdown_envelope() {
        assert_eq!(
            unwrap_content(r#"{"markdown": "Hello **world**"}"#),
            "Hello **world**"
        );
    }

    #[test]
    fn test_malformed_envelope_falls_back_to_raw() {
        let raw = r#"{"markdown": "#;
        assert_eq!(unwrap_content(raw), raw);
        assert_eq!(display_content(raw, 5), r#"{"mar"#);
    }

    #[test]
    fn test_envelope_without_markdown_string_is_raw() {
        let raw = r#"{"markdown": 42}"#;
        assert_eq!(unwrap_content(raw), raw);
        assert_eq!(unwrap_content("plain text"), "plain text");
    }

    #[test]
    fn test_display_content_is_char_safe() {
        assert_eq!(display_content("pão de açúcar", 3), "pão");
        assert_eq!(display_content("", 10), "");
    }
}
