//! Browser error types.

use {cartograph_dom::DomError, thiserror::Error};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: Chrome/Chromium not found")]
    BrowserNotAvailable,

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let message = err.to_string();
        if is_connection_closed(&message) {
            BrowserError::ConnectionClosed(message)
        } else {
            BrowserError::Cdp(message)
        }
    }
}

/// Dead websocket or crashed target, as reported by chromiumoxide.
pub(crate) fn is_connection_closed(message: &str) -> bool {
    message.contains("AlreadyClosed") || message.contains("ConnectionClosed")
}

impl From<BrowserError> for DomError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::InvalidSelector { selector, reason } => {
                DomError::selector_syntax(selector, reason)
            },
            BrowserError::NodeNotFound(path) => DomError::NodeNotFound { path },
            BrowserError::ConnectionClosed(message) => DomError::SessionUnavailable(message),
            other => DomError::Backend(other.to_string()),
        }
    }
}
