use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    /// Missing or unusable provider configuration (e.g. no API key).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rejected locally before any network activity.
    #[error("{0}")]
    Validation(String),

    /// Non-success answer from the chat or vision provider.
    #[error("{0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A request is already in progress")]
    Busy,

    #[error("Chat is closed")]
    NotOpen,

    #[error("Chat controller has shut down")]
    ChannelClosed,
}

impl TutorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
