use async_trait::async_trait;

use crate::application::PartialCallback;
use crate::domain::{Completion, DomainError, GenerationParams, Turn};

/// An interface for sending a role-tagged conversation to an LLM and receiving
/// the generated text.
///
/// Implementors encapsulate transport, serialization, and vendor-specific API
/// details. Consumers (e.g. [`super::LlmChatService`]) remain decoupled from
/// any particular provider or HTTP client library.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        turns: &[Turn],
        params: &GenerationParams,
    ) -> Result<Completion, DomainError>;

    /// Streams the completion, calling `on_partial` with the cumulative text
    /// after every non-empty delta.
    ///
    /// Clients without streaming support report the finished text once.
    async fn complete_streaming(
        &self,
        turns: &[Turn],
        params: &GenerationParams,
        on_partial: PartialCallback<'_>,
    ) -> Result<Completion, DomainError> {
        let completion = self.complete(turns, params).await?;
        on_partial(completion.text());
        Ok(completion)
    }

    /// Deployment or model identifier, for logging.
    fn model_name(&self) -> &str;
}
