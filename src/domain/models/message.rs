use std::fmt;

use serde::{Deserialize, Serialize};

/// Session-unique message identifier. Allocated from a monotonically
/// increasing counter, never from the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "tufti")]
    Assistant,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
            Sender::System => "system",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User annotation attached to a message after it was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl MessageFeedback {
    pub fn liked() -> Self {
        Self {
            liked: Some(true),
            ..Self::default()
        }
    }

    pub fn disliked() -> Self {
        Self {
            liked: Some(false),
            ..Self::default()
        }
    }

    pub fn reported(comment: Option<String>) -> Self {
        Self {
            reported: Some(true),
            comment,
            ..Self::default()
        }
    }
}

/// Generation details set once when an assistant message is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl MessageMetadata {
    pub fn with_relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn with_source_confidence(mut self, confidence: f64) -> Self {
        self.source_confidence = Some(confidence);
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = Some(cached);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    text: String,
    sender: Sender,
    /// Creation time in milliseconds since the Unix epoch.
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feedback: Option<MessageFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(id: MessageId, text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            timestamp: current_timestamp_millis(),
            feedback: None,
            metadata: None,
        }
    }

    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, text, Sender::User)
    }

    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, text, Sender::Assistant)
    }

    pub fn system(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, text, Sender::System)
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Same message under a new id, used when a session adopts messages
    /// loaded from an older log.
    pub fn reidentified(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn feedback(&self) -> Option<&MessageFeedback> {
        self.feedback.as_ref()
    }

    pub fn metadata(&self) -> Option<&MessageMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == Sender::User
    }

    pub fn is_from_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }

    /// Replaces the feedback annotation. Text and metadata stay untouched.
    pub fn set_feedback(&mut self, feedback: Option<MessageFeedback>) {
        self.feedback = feedback;
    }
}

pub(crate) fn current_timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
