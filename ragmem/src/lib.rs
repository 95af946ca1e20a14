//! Retrieval-augmented answering over a document vector index, with durable
//! per-session conversation memory.

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod models;
pub mod services;
pub mod state;

pub use error::{RagError, Result};
