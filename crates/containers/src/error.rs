use {cartograph_dom::DomError, thiserror::Error};

/// Problems found while loading a container library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid library document: {0}")]
    Format(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("container '{id}' declares no selectors")]
    NoSelectors { id: String },

    #[error("container '{parent}' lists unknown child '{child}'")]
    UnknownChild { parent: String, child: String },

    #[error("container '{child}' is listed as a child of both '{first}' and '{second}'")]
    DuplicateParent {
        child: String,
        first: String,
        second: String,
    },

    #[error("children form a cycle: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// Failures that abort a match. Selector syntax errors never reach here.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("no container library for {url}")]
    LibraryNotFound { url: String },

    #[error(transparent)]
    Dom(DomError),
}

impl From<DomError> for MatchError {
    fn from(err: DomError) -> Self {
        match err {
            DomError::SessionUnavailable(session) => Self::SessionUnavailable(session),
            other => Self::Dom(other),
        }
    }
}

pub type MatchResult<T> = Result<T, MatchError>;
