use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::{ChatService, ContextBuilder, PartialCallback};
use crate::connector::adapter::ChatClient;
use crate::domain::{
    Completion, DomainError, GeneratedResponse, GenerationParams, Message, MessageMetadata, Turn,
    UserProfile,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A [`ChatService`] that assembles the context window with a
/// [`ContextBuilder`] and sends it through any [`ChatClient`].
///
/// Every call is bounded by a timeout; expiry surfaces as a transport error.
/// The last submitted context window is kept for diagnostics and dropped by
/// [`ChatService::clear_context`].
pub struct LlmChatService {
    client: Arc<dyn ChatClient>,
    context_builder: ContextBuilder,
    params: GenerationParams,
    timeout: Duration,
    last_context: Mutex<Vec<Turn>>,
}

impl LlmChatService {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            context_builder: ContextBuilder::new(),
            params: GenerationParams::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            last_context: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context_builder(mut self, builder: ContextBuilder) -> Self {
        self.context_builder = builder;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The context window most recently sent to the backend.
    pub async fn last_context(&self) -> Vec<Turn> {
        self.last_context.lock().await.clone()
    }

    async fn prepare(&self, user_text: &str, profile: &UserProfile, history: &[Message]) -> Vec<Turn> {
        let turns = self.context_builder.build(Some(profile), history, user_text);
        debug!(
            "Context window for {}: {} turns ({} history messages available)",
            self.client.model_name(),
            turns.len(),
            history.len()
        );
        *self.last_context.lock().await = turns.clone();
        turns
    }

    fn elapsed_error(&self) -> DomainError {
        DomainError::transport(format!(
            "no response from {} within {:.0}s",
            self.client.model_name(),
            self.timeout.as_secs_f64()
        ))
    }
}

/// Maps the backend finish reason onto a confidence hint for the UI.
fn source_confidence(finish_reason: Option<&str>) -> Option<f64> {
    match finish_reason {
        Some("stop") => Some(1.0),
        Some("length") => Some(0.5),
        _ => None,
    }
}

fn into_response(completion: Completion) -> Result<GeneratedResponse, DomainError> {
    if completion.text().trim().is_empty() {
        return Err(DomainError::empty_response("no response generated"));
    }

    let mut metadata = MessageMetadata::default().with_cached(false);
    if let Some(confidence) = source_confidence(completion.finish_reason()) {
        metadata = metadata.with_source_confidence(confidence);
    }

    Ok(GeneratedResponse::new(completion.into_text()).with_metadata(metadata))
}

#[async_trait]
impl ChatService for LlmChatService {
    async fn generate_response(
        &self,
        user_text: &str,
        profile: &UserProfile,
        history: &[Message],
    ) -> Result<GeneratedResponse, DomainError> {
        let turns = self.prepare(user_text, profile, history).await;
        let start_time = Instant::now();

        let completion = tokio::time::timeout(self.timeout, self.client.complete(&turns, &self.params))
            .await
            .map_err(|_| self.elapsed_error())??;

        info!(
            "Generated response with {} in {:.2}s",
            self.client.model_name(),
            start_time.elapsed().as_secs_f64()
        );
        into_response(completion)
    }

    async fn generate_response_streaming(
        &self,
        user_text: &str,
        profile: &UserProfile,
        history: &[Message],
        on_partial: PartialCallback<'_>,
    ) -> Result<GeneratedResponse, DomainError> {
        let turns = self.prepare(user_text, profile, history).await;
        let start_time = Instant::now();

        let completion = tokio::time::timeout(
            self.timeout,
            self.client.complete_streaming(&turns, &self.params, on_partial),
        )
        .await
        .map_err(|_| self.elapsed_error())??;

        info!(
            "Streamed response with {} in {:.2}s",
            self.client.model_name(),
            start_time.elapsed().as_secs_f64()
        );
        into_response(completion)
    }

    async fn clear_context(&self) {
        self.last_context.lock().await.clear();
        debug!("Cleared cached context for {}", self.client.model_name());
    }
}
