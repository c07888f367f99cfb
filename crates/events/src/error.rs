use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("handler '{handler}' failed on '{topic}': {message}")]
    Handler {
        topic: String,
        handler: String,
        message: String,
    },
}

impl EventError {
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
