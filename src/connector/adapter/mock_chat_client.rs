use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::application::PartialCallback;
use crate::connector::adapter::ChatClient;
use crate::domain::{Completion, DomainError, GenerationParams, StreamAccumulator, Turn, TurnRole};

const MOCK_REPLIES: &[&str] = &[
    "Ah, my dear, you are asleep in the scene again. Stop the film for a moment and look \
     at the frame you are standing in. What would you compose instead?",
    "Consider the pendulum that is swinging you. It feeds on your importance. Lower the \
     importance and it will lose its grip on the reel.",
    "Feel the plait of intention between your shoulder blades. Hold the image of the next \
     frame there, calmly, as if it has already been filmed.",
    "The mirror of the world only reflects what you project. Smile at it first, my dear, \
     and wait for the reflection to catch up.",
    "Do not fight the current scene. Acknowledge it, wake up inside it, and then choose \
     the frame that comes next.",
];

/// Offline [`ChatClient`] returning canned guidance.
///
/// The reply is chosen deterministically from the last user turn, so the same
/// question always yields the same answer. Streaming emits one delta per word.
pub struct MockChatClient {
    failing: bool,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self { failing: false }
    }

    /// A client whose every call fails with a transport error.
    pub fn failing() -> Self {
        Self { failing: true }
    }

    fn reply_for(&self, turns: &[Turn]) -> Result<String, DomainError> {
        if self.failing {
            return Err(DomainError::transport("mock chat client is set to fail"));
        }

        let question = turns
            .iter()
            .rev()
            .find(|t| t.role() == TurnRole::User)
            .map(|t| t.content())
            .unwrap_or_default();

        let mut hasher = DefaultHasher::new();
        question.hash(&mut hasher);
        let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());

        let reply = MOCK_REPLIES
            .choose(&mut rng)
            .copied()
            .unwrap_or(MOCK_REPLIES[0]);
        debug!("MockChatClient: answering {} turns", turns.len());
        Ok(reply.to_string())
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        turns: &[Turn],
        _params: &GenerationParams,
    ) -> Result<Completion, DomainError> {
        let reply = self.reply_for(turns)?;
        Ok(Completion::new(reply, Some("stop".to_string())))
    }

    async fn complete_streaming(
        &self,
        turns: &[Turn],
        _params: &GenerationParams,
        on_partial: PartialCallback<'_>,
    ) -> Result<Completion, DomainError> {
        let reply = self.reply_for(turns)?;
        let mut acc = StreamAccumulator::new();

        for delta in reply.split_inclusive(' ') {
            if let Some(text) = acc.push(delta) {
                on_partial(text);
            }
            tokio::task::yield_now().await;
        }

        acc.set_finish_reason("stop");
        Ok(acc.finish())
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}
