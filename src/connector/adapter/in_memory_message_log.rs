use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::MessageLog;
use crate::domain::{DomainError, Message};

/// Process-local [`MessageLog`] holding messages oldest-first.
pub struct InMemoryMessageLog {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Seeds the log; `messages` must already be in chronological order.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(Mutex::new(messages)),
        }
    }

    /// Loads a JSON array of messages, e.g. a transcript exported from an
    /// earlier session.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let mut messages: Vec<Message> = serde_json::from_str(&raw).map_err(|e| {
            DomainError::invalid_input(format!("invalid history file {}: {e}", path.display()))
        })?;
        messages.sort_by_key(|m| m.timestamp());

        debug!("Loaded {} archived messages from {}", messages.len(), path.display());
        Ok(Self::with_messages(messages))
    }

    pub async fn append(&self, message: Message) {
        self.messages.lock().await.push(message);
    }
}

impl Default for InMemoryMessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn load_page(&self, offset: usize, limit: usize) -> Result<Vec<Message>, DomainError> {
        let messages = self.messages.lock().await;
        let end = messages.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);
        Ok(messages[start..end].to_vec())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.messages.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    fn numbered(n: u64) -> Vec<Message> {
        (1..=n)
            .map(|i| Message::user(MessageId::new(i), format!("m{i}")).with_timestamp(i as i64))
            .collect()
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text()).collect()
    }

    #[tokio::test]
    async fn test_pages_walk_backwards_oldest_first() {
        let log = InMemoryMessageLog::with_messages(numbered(5));

        let newest = log.load_page(0, 2).await.unwrap();
        assert_eq!(texts(&newest), vec!["m4", "m5"]);

        let older = log.load_page(2, 2).await.unwrap();
        assert_eq!(texts(&older), vec!["m2", "m3"]);

        let oldest = log.load_page(4, 2).await.unwrap();
        assert_eq!(texts(&oldest), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let log = InMemoryMessageLog::with_messages(numbered(3));
        assert!(log.load_page(10, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_count() {
        let log = InMemoryMessageLog::new();
        log.append(Message::user(MessageId::new(1), "hi")).await;
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_json_file_sorts_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 2, "text": "second", "sender": "tufti", "timestamp": 200},
                {"id": 1, "text": "first", "sender": "user", "timestamp": 100}
            ]"#,
        )
        .unwrap();

        let log = InMemoryMessageLog::from_json_file(&path).await.unwrap();
        let page = log.load_page(0, 20).await.unwrap();
        assert_eq!(texts(&page), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_from_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let err = InMemoryMessageLog::from_json_file(&path).await.err().unwrap();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}
