use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::application::{ChatService, ChatSession, ContextBuilder};
use crate::connector::adapter::{
    AzureOpenAiClient, AzureOpenAiConfig, ChatClient, InMemoryMessageLog, LlmChatService,
    MockChatClient,
};
use crate::domain::UserProfile;

pub struct ContainerConfig {
    /// Answer from canned replies instead of calling Azure OpenAI.
    pub mock_llm: bool,
    pub timeout_secs: u64,
    /// Trailing history messages sent with each request; `0` sends them all.
    pub max_context_turns: usize,
    /// JSON transcript that older pages are loaded from.
    pub history_file: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            mock_llm: false,
            timeout_secs: 60,
            max_context_turns: crate::application::DEFAULT_MAX_HISTORY_TURNS,
            history_file: None,
        }
    }
}

/// Builds the chat service and message log once per process and hands them
/// to every session it opens.
pub struct Container {
    chat_client: Arc<dyn ChatClient>,
    chat_service: Arc<LlmChatService>,
    message_log: Option<Arc<InMemoryMessageLog>>,
    endpoint: Option<String>,
    config: ContainerConfig,
}

impl Container {
    /// Fails when the Azure OpenAI configuration is missing or invalid, so a
    /// broken setup is reported before the first conversation starts.
    pub async fn new(config: ContainerConfig) -> Result<Self> {
        let (chat_client, endpoint): (Arc<dyn ChatClient>, Option<String>) = if config.mock_llm {
            debug!("Using mock chat client");
            (Arc::new(MockChatClient::new()), None)
        } else {
            debug!("Initializing Azure OpenAI client...");
            let azure_config = AzureOpenAiConfig::from_env()
                .context("Azure OpenAI is not configured (use --mock-llm to run offline)")?;
            let endpoint = azure_config.endpoint().to_string();
            (Arc::new(AzureOpenAiClient::new(azure_config)?), Some(endpoint))
        };

        let max_turns = match config.max_context_turns {
            0 => None,
            n => Some(n),
        };
        let chat_service = Arc::new(
            LlmChatService::new(Arc::clone(&chat_client))
                .with_context_builder(ContextBuilder::new().with_max_history_turns(max_turns))
                .with_timeout(Duration::from_secs(config.timeout_secs.max(1))),
        );

        let message_log = match &config.history_file {
            Some(path) => {
                let log = InMemoryMessageLog::from_json_file(path)
                    .await
                    .with_context(|| format!("failed to load history from {}", path.display()))?;
                Some(Arc::new(log))
            }
            None => None,
        };

        info!("Chat backend ready: {}", chat_client.model_name());

        Ok(Self {
            chat_client,
            chat_service,
            message_log,
            endpoint,
            config,
        })
    }

    pub fn chat_service(&self) -> Arc<dyn ChatService> {
        self.chat_service.clone()
    }

    /// Starts a session for `profile`, preloading the newest archived page
    /// when a history file is configured.
    pub async fn open_session(&self, profile: UserProfile) -> ChatSession {
        let session = ChatSession::new(profile, self.chat_service());
        match &self.message_log {
            Some(log) => {
                let session = session.with_message_log(log.clone());
                session.preload_recent().await;
                session
            }
            None => session,
        }
    }

    pub fn model_name(&self) -> &str {
        self.chat_client.model_name()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn message_log(&self) -> Option<&Arc<InMemoryMessageLog>> {
        self.message_log.as_ref()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> ContainerConfig {
        ContainerConfig {
            mock_llm: true,
            ..ContainerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_mock_container_opens_welcomed_session() {
        let container = Container::new(mock_config()).await.unwrap();
        let session = container.open_session(UserProfile::new("Alice")).await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text().contains("Alice"));
        assert!(!session.has_more().await);
        assert_eq!(container.model_name(), "mock-chat");
    }

    #[tokio::test]
    async fn test_history_file_preloads_newest_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let archived: Vec<String> = (1..=25)
            .map(|i| {
                format!(r#"{{"id": {i}, "text": "old {i}", "sender": "user", "timestamp": {i}}}"#)
            })
            .collect();
        std::fs::write(&path, format!("[{}]", archived.join(","))).unwrap();

        let container = Container::new(ContainerConfig {
            history_file: Some(path),
            ..mock_config()
        })
        .await
        .unwrap();
        let session = container.open_session(UserProfile::new("Alice")).await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 21);
        assert_eq!(messages[0].text(), "old 6");
        assert!(session.has_more().await);
        assert_eq!(session.page().await, 1);
    }
}
