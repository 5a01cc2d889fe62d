mod chat_session;
mod context_builder;

pub use chat_session::*;
pub use context_builder::*;
