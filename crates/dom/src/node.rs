use serde::{Deserialize, Serialize};

use crate::path::DomPath;

/// Address-only view of a DOM element, expanded to a bounded depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub path: DomPath,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// True number of element children, even when `children` is truncated.
    pub child_count: usize,
    #[serde(default)]
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn is_truncated(&self) -> bool {
        self.children.len() < self.child_count
    }

    /// Depth-first search by path within this expanded branch.
    pub fn find(&self, path: &DomPath) -> Option<&DomNode> {
        if &self.path == path {
            return Some(self);
        }
        if !self.path.contains(path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}

/// Shallow facts about a single element, as reported by a [`crate::DomQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub child_count: usize,
}

/// Result of a selector query: the first `limit` hits and the true total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub paths: Vec<DomPath>,
    pub total: usize,
}

impl QueryOutcome {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
