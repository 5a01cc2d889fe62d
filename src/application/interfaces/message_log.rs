use async_trait::async_trait;

use crate::domain::{DomainError, Message};

/// Backing log of earlier messages that the chat session pages through.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Returns up to `limit` messages older than the newest `offset` ones,
    /// oldest first. A page shorter than `limit` means the log is exhausted.
    async fn load_page(&self, offset: usize, limit: usize) -> Result<Vec<Message>, DomainError>;

    async fn count(&self) -> Result<usize, DomainError>;
}
