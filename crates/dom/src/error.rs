use thiserror::Error;

/// Errors raised at the DOM query boundary.
#[derive(Debug, Error)]
pub enum DomError {
    /// The selector could not be parsed. Matchers treat this as "no match".
    #[error("invalid selector '{selector}': {reason}")]
    SelectorSyntax { selector: String, reason: String },

    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("node not found: {path}")]
    NodeNotFound { path: String },

    #[error("invalid dom path '{0}'")]
    InvalidPath(String),

    /// Any other failure reported by the backing page.
    #[error("dom backend error: {0}")]
    Backend(String),
}

impl DomError {
    #[must_use]
    pub fn selector_syntax(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SelectorSyntax {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn node_not_found(path: impl ToString) -> Self {
        Self::NodeNotFound {
            path: path.to_string(),
        }
    }

    pub fn is_selector_syntax(&self) -> bool {
        matches!(self, Self::SelectorSyntax { .. })
    }
}

pub type Result<T> = std::result::Result<T, DomError>;
