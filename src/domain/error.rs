use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Missing or invalid credentials/endpoint. Not retryable without operator action.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure, timeout or non-success status from the completion backend.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn empty_response(msg: impl Into<String>) -> Self {
        Self::EmptyResponse(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Empty responses are retried the same way transport failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::EmptyResponse(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_empty_response_are_retryable() {
        assert!(DomainError::transport("timeout").is_retryable());
        assert!(DomainError::empty_response("no choices").is_retryable());
        assert!(!DomainError::configuration("missing key").is_retryable());
        assert!(!DomainError::invalid_input("blank name").is_retryable());
        assert!(!DomainError::storage("log offline").is_retryable());
    }

    #[test]
    fn display_includes_category() {
        let err = DomainError::configuration("AZURE_OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: AZURE_OPENAI_API_KEY is not set"
        );
    }
}
