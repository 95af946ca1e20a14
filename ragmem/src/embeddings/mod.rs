mod api;
mod cache;
mod provider;

pub use api::{ApiConfig, VoyageApiClient};
pub use cache::QueryEmbeddingCache;
pub use provider::{Embedder, UnavailableEmbedder, VoyageEmbedder};
