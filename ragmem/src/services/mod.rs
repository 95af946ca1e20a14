mod conversation;
mod retriever;
mod session;

pub use conversation::{ConversationOrchestrator, SessionLocks};
pub use retriever::{display_content, unwrap_content, Retriever};
pub use session::SessionContextManager;
