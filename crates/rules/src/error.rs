use {cartograph_events::EventError, thiserror::Error};

#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule definition is incomplete or conflicts with an existing one.
    /// Nothing was registered.
    #[error("invalid rule: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Event(#[from] EventError),
}

impl RuleError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
