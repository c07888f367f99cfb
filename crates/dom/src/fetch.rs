//! Incremental DOM branch expansion by address.
//!
//! Matching only ever serializes a shallow view of the page; callers pull
//! deeper structure one branch at a time with [`BranchFetcher::fetch_branch`],
//! using the `childCount` of a truncated node to decide whether to follow up.

use {
    futures::future::{BoxFuture, FutureExt},
    tracing::{debug, warn},
};

use crate::{
    error::{DomError, Result},
    node::DomNode,
    path::DomPath,
    query::DomQuery,
};

/// Hard ceilings applied to every fetch, whatever the caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub depth_cap: usize,
    pub children_cap: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            depth_cap: 10,
            children_cap: 500,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BranchFetcher {
    limits: FetchLimits,
}

impl BranchFetcher {
    pub fn new(limits: FetchLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> FetchLimits {
        self.limits
    }

    /// Return the node at `path` with up to `max_depth` levels of children,
    /// at most `max_children` per level.
    ///
    /// `child_count` always reports the real number of children. A missing
    /// node at `path` fails with [`DomError::NodeNotFound`]; children that
    /// vanish mid-walk are skipped.
    pub async fn fetch_branch(
        &self,
        dom: &dyn DomQuery,
        path: &DomPath,
        max_depth: usize,
        max_children: usize,
    ) -> Result<DomNode> {
        let depth = max_depth.min(self.limits.depth_cap);
        let breadth = max_children.min(self.limits.children_cap);
        if depth < max_depth || breadth < max_children {
            debug!(
                %path,
                requested_depth = max_depth,
                requested_children = max_children,
                depth,
                breadth,
                "clamped branch fetch limits"
            );
        }

        let node = expand(dom, path.clone(), depth, breadth).await?;
        debug!(%path, depth, breadth, child_count = node.child_count, "fetched dom branch");
        Ok(node)
    }

    /// Fetch the whole page from the document element.
    pub async fn fetch_root(
        &self,
        dom: &dyn DomQuery,
        max_depth: usize,
        max_children: usize,
    ) -> Result<DomNode> {
        self.fetch_branch(dom, &DomPath::root(), max_depth, max_children)
            .await
    }
}

fn expand<'a>(
    dom: &'a dyn DomQuery,
    path: DomPath,
    depth: usize,
    breadth: usize,
) -> BoxFuture<'a, Result<DomNode>> {
    async move {
        let info = dom.inspect(&path).await?;
        let mut node = DomNode {
            path: path.clone(),
            tag: info.tag,
            id: info.id,
            classes: info.classes,
            child_count: info.child_count,
            children: Vec::new(),
        };
        if depth == 0 {
            return Ok(node);
        }

        for index in 0..info.child_count.min(breadth) {
            let child_path = path.child(index);
            match expand(dom, child_path.clone(), depth - 1, breadth).await {
                Ok(child) => node.children.push(child),
                Err(DomError::NodeNotFound { .. }) => {
                    warn!(path = %child_path, "child disappeared during branch fetch");
                },
                Err(e) => return Err(e),
            }
        }
        Ok(node)
    }
    .boxed()
}
