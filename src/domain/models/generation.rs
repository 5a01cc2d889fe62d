use serde::{Deserialize, Serialize};

use super::MessageMetadata;

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
            top_p: 0.92,
            frequency_penalty: 0.18,
            presence_penalty: 0.15,
        }
    }
}

/// Raw output of one completion call, before it becomes a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    text: String,
    finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>, finish_reason: Option<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// What the chat service hands back to the session: the reply text plus any
/// metadata worth attaching to the assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub text: String,
    pub metadata: Option<MessageMetadata>,
}

impl GeneratedResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Folds streamed deltas into the cumulative text seen so far.
///
/// Consumers only ever observe the full text up to the latest delta, so the
/// last value reported equals the value returned by [`StreamAccumulator::finish`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    finish_reason: Option<String>,
    deltas: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta and returns the cumulative text. Empty deltas are
    /// ignored and return `None` so callers don't emit duplicate updates.
    pub fn push(&mut self, delta: &str) -> Option<&str> {
        if delta.is_empty() {
            return None;
        }
        self.text.push_str(delta);
        self.deltas += 1;
        Some(&self.text)
    }

    pub fn set_finish_reason(&mut self, reason: impl Into<String>) {
        self.finish_reason = Some(reason.into());
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    pub fn finish(self) -> Completion {
        Completion::new(self.text, self.finish_reason)
    }
}
