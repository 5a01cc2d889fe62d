mod azure_openai_client;
mod chat_client;
mod in_memory_message_log;
mod llm_chat_service;
mod mock_chat_client;

pub use azure_openai_client::*;
pub use chat_client::*;
pub use in_memory_message_log::*;
pub use llm_chat_service::*;
pub use mock_chat_client::*;
