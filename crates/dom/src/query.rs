use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::Result,
    node::{NodeInfo, QueryOutcome},
    path::DomPath,
};

/// Read-only access to one live page.
///
/// Implementations own timeouts and transport; callers only see paths.
#[async_trait]
pub trait DomQuery: Send + Sync {
    /// Elements matching `selector`, in document order.
    ///
    /// With a `scope`, only the scope element itself and its descendants are
    /// considered. At most `limit` paths are returned; `total` reports every
    /// hit. Unparseable selectors fail with [`crate::DomError::SelectorSyntax`].
    async fn query(
        &self,
        scope: Option<&DomPath>,
        selector: &str,
        limit: usize,
    ) -> Result<QueryOutcome>;

    /// Shallow information about the element at `path`.
    ///
    /// Fails with [`crate::DomError::NodeNotFound`] for stale or invalid paths.
    async fn inspect(&self, path: &DomPath) -> Result<NodeInfo>;
}

/// Lookup of live pages by session id.
#[async_trait]
pub trait DomSessions: Send + Sync {
    /// Fails with [`crate::DomError::SessionUnavailable`] when the session or
    /// its page is gone.
    async fn session(&self, session_id: &str) -> Result<Arc<dyn DomQuery>>;
}
