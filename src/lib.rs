pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    ChatService, ChatSession, ContextBuilder, MessageLog, PartialCallback, SendPhase,
    SessionEvent, SessionSnapshot, APOLOGY_TEXT, DEFAULT_MAX_HISTORY_TURNS, MESSAGES_PER_PAGE,
};

pub use cli::{Commands, ProfileArgs};

pub use connector::{
    AzureOpenAiClient, AzureOpenAiConfig, ChatClient, ChatController, Container,
    ContainerConfig, InMemoryMessageLog, LlmChatService, MockChatClient, Router,
};

pub use domain::{
    Book, Completion, DomainError, ExperienceLevel, GeneratedResponse, GenerationParams, Message,
    MessageFeedback, MessageId, MessageMetadata, Preferences, RealityFocus, Sender, Theme,
    TransformationIntent, Turn, TurnRole, UserProfile,
};
