pub mod backends;
pub mod traits;

pub use backends::astra::AstraVectorStore;
pub use backends::memory::{InMemoryMemoryStore, InMemoryVectorStore};
pub use backends::zep::ZepMemoryStore;
pub use traits::*;
