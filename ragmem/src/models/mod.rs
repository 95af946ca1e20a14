mod chunk;
mod context;
mod conversation;

pub use chunk::*;
pub use context::*;
pub use conversation::*;
