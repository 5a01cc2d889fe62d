use async_trait::async_trait;

use crate::domain::{DomainError, GeneratedResponse, Message, UserProfile};

/// Receives the cumulative reply text each time a streamed completion grows.
pub type PartialCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Produces the assistant's reply to a user turn.
///
/// Implementors own prompt assembly and transport; the chat session only hands
/// over the new text, the profile, and the history that precedes it.
/// One call is in flight per session at a time, so streamed output never mixes
/// two replies into one buffer.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn generate_response(
        &self,
        user_text: &str,
        profile: &UserProfile,
        history: &[Message],
    ) -> Result<GeneratedResponse, DomainError>;

    /// Streaming variant. `on_partial` receives the cumulative text in arrival
    /// order and its final value equals the returned response text.
    ///
    /// The default implementation does not stream: it reports the finished
    /// text once.
    async fn generate_response_streaming(
        &self,
        user_text: &str,
        profile: &UserProfile,
        history: &[Message],
        on_partial: PartialCallback<'_>,
    ) -> Result<GeneratedResponse, DomainError> {
        let response = self.generate_response(user_text, profile, history).await?;
        on_partial(&response.text);
        Ok(response)
    }

    /// Drops any conversational context cached on the service side.
    async fn clear_context(&self);
}
