use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One retrievable unit of ingested content: a page's text plus an optional
/// reference to the page screenshot stored elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_name: String,
    /// 1-based page number within the source document.
    pub page_number: u32,
    pub content: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Raw record returned by a vector store before it is shaped into a [`Chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

impl VectorMatch {
    pub fn new(id: impl Into<String>, score: f32, payload: Value) -> Self {
        Self {
            id: id.into(),
            score,
            payload,
        }
    }

    /// Shape the payload into a chunk. Missing fields get neutral defaults;
    /// a page number of 0 or below is clamped to page 1.
    pub fn into_chunk(self) -> Chunk {
        let text = |key: &str| {
            self.payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let page_number = self
            .payload
            .get("page_number")
            .and_then(|value| {
                value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
            })
            .map(|page| u32::try_from(page.max(1)).unwrap_or(u32::MAX))
            .unwrap_or(1);

        let content = self
            .payload
            .get("content")
            .map(|value| match value {
                Value::String(raw) => raw.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        Chunk {
            document_name: text("document_name").unwrap_or_default(),
            image_url: text("image_url").filter(|url| !url.is_empty()),
            chunk_id: self.id,
            page_number,
            content,
            similarity: self.score,
        }
    }
}

/// A document page known to the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub document_name: String,
    pub page_number: u32,
}

/// Outcome of a single retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Ordered by descending similarity.
    pub chunks: Vec<Chunk>,
    pub total: usize,
    pub success: bool,
    pub message: String,
}

impl SearchResult {
    pub fn found(chunks: Vec<Chunk>) -> Self {
        let total = chunks.len();
        let message = if total == 0 {
            "No results found".to_string()
        } else {
            format!("Found {total} results")
        };
        Self {
            chunks,
            total,
            success: true,
            message,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Human-readable listing of the results, each chunk's content cut to
    /// `display_length` characters.
    pub fn summary(&self, display_length: usize) -> String {
        if self.chunks.is_empty() {
            return self.message.clone();
        }

        let mut out = format!("{} results:\n", self.total);
        for (index, chunk) in self.chunks.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {} (page {}), score {:.3}\n   {}\n",
                index + 1,
                chunk.document_name,
                chunk.page_number,
                chunk.similarity,
                crate::services::display_content(&chunk.content, display_length)
            ));
            if let Some(url) = &chunk.image_url {
                out.push_str(&format!("   image: {url}\n"));
            }
        }
        out
    }
}
