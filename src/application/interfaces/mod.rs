mod chat_service;
mod message_log;

pub use chat_service::*;
pub use message_log::*;
