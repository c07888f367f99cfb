//! In-memory DOM backed by an element tree. Used by tests and fixtures.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{
    error::{DomError, Result},
    node::{NodeInfo, QueryOutcome},
    path::DomPath,
    query::{DomQuery, DomSessions},
    selector::{SelectorList, Subject, Tree, matches_list},
};

/// Builder-style element description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }
}

impl Subject for Element {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            _ => self.attrs.get(name).cloned(),
        }
    }
}

struct Slot {
    path: DomPath,
    parent: Option<usize>,
    element: Element,
    child_count: usize,
}

/// A flattened, immutable element tree addressed by [`DomPath`].
pub struct MemoryDom {
    /// Document order (pre-order).
    slots: Vec<Slot>,
    by_path: HashMap<DomPath, usize>,
}

impl MemoryDom {
    pub fn new(root: Element) -> Self {
        let mut dom = Self {
            slots: Vec::new(),
            by_path: HashMap::new(),
        };
        dom.flatten(root, DomPath::root(), None);
        dom
    }

    fn flatten(&mut self, mut element: Element, path: DomPath, parent: Option<usize>) {
        let children = std::mem::take(&mut element.children);
        let index = self.slots.len();
        self.by_path.insert(path.clone(), index);
        self.slots.push(Slot {
            path: path.clone(),
            parent,
            element,
            child_count: children.len(),
        });
        for (i, child) in children.into_iter().enumerate() {
            self.flatten(child, path.child(i), Some(index));
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pre-order slot range covering `path` and all its descendants.
    fn subtree(&self, path: &DomPath) -> Option<std::ops::Range<usize>> {
        let start = *self.by_path.get(path)?;
        let end = self.slots[start + 1..]
            .iter()
            .position(|s| !path.contains(&s.path))
            .map_or(self.slots.len(), |offset| start + 1 + offset);
        Some(start..end)
    }
}

impl Tree for MemoryDom {
    type Node = usize;
    type Subject = Element;

    fn subject(&self, node: usize) -> &Element {
        &self.slots[node].element
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.slots[node].parent
    }
}

#[async_trait]
impl DomQuery for MemoryDom {
    async fn query(
        &self,
        scope: Option<&DomPath>,
        selector: &str,
        limit: usize,
    ) -> Result<QueryOutcome> {
        let list = SelectorList::parse(selector)?;
        let range = match scope {
            Some(path) => self
                .subtree(path)
                .ok_or_else(|| DomError::node_not_found(path))?,
            None => 0..self.slots.len(),
        };

        let mut outcome = QueryOutcome::default();
        for index in range {
            if matches_list(self, &list, index) {
                outcome.total += 1;
                if outcome.paths.len() < limit {
                    outcome.paths.push(self.slots[index].path.clone());
                }
            }
        }
        Ok(outcome)
    }

    async fn inspect(&self, path: &DomPath) -> Result<NodeInfo> {
        let slot = self
            .by_path
            .get(path)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| DomError::node_not_found(path))?;
        Ok(NodeInfo {
            tag: slot.element.tag.clone(),
            id: slot.element.id.clone(),
            classes: slot.element.classes.clone(),
            child_count: slot.child_count,
        })
    }
}

/// Session table over in-memory pages.
#[derive(Default)]
pub struct MemorySessions {
    pages: RwLock<HashMap<String, Arc<dyn DomQuery>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: impl Into<String>, page: Arc<dyn DomQuery>) {
        self.pages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.into(), page);
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.pages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .is_some()
    }
}

#[async_trait]
impl DomSessions for MemorySessions {
    async fn session(&self, session_id: &str) -> Result<Arc<dyn DomQuery>> {
        self.pages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
            .ok_or_else(|| DomError::SessionUnavailable(session_id.to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> MemoryDom {
        MemoryDom::new(
            Element::new("html").children([
                Element::new("head"),
                Element::new("body").child(
                    Element::new("main").id("app").children([
                        Element::new("ul").class("feed").children([
                            Element::new("li").class("post").attr("data-id", "1"),
                            Element::new("li").class("post").attr("data-id", "2"),
                            Element::new("li").class("ad"),
                        ]),
                        Element::new("div").class("post"),
                    ]),
                ),
            ]),
        )
    }

    fn paths(outcome: &QueryOutcome) -> Vec<String> {
        outcome.paths.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn query_whole_document_in_order() {
        let dom = page();
        let out = dom.query(None, ".post", 10).await.unwrap();
        assert_eq!(out.total, 3);
        assert_eq!(paths(&out), vec!["root/1/0/0/0", "root/1/0/0/1", "root/1/0/1"]);
    }

    #[tokio::test]
    async fn query_respects_limit_but_reports_total() {
        let dom = page();
        let out = dom.query(None, "li", 2).await.unwrap();
        assert_eq!(out.total, 3);
        assert_eq!(out.paths.len(), 2);
    }

    #[tokio::test]
    async fn scoped_query_includes_scope_and_descendants_only() {
        let dom = page();
        let feed: DomPath = "root/1/0/0".parse().unwrap();
        let out = dom.query(Some(&feed), ".post", 10).await.unwrap();
        assert_eq!(paths(&out), vec!["root/1/0/0/0", "root/1/0/0/1"]);

        let out = dom.query(Some(&feed), "ul.feed", 10).await.unwrap();
        assert_eq!(paths(&out), vec!["root/1/0/0"]);
    }

    #[tokio::test]
    async fn combinators_match_against_full_ancestry() {
        let dom = page();
        let feed: DomPath = "root/1/0/0".parse().unwrap();
        let out = dom.query(Some(&feed), "#app > ul li[data-id]", 10).await.unwrap();
        assert_eq!(out.total, 2);
        let out = dom.query(None, "body > li", 10).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn invalid_selector_is_syntax_error() {
        let dom = page();
        let err = dom.query(None, "li:nth-child(2)", 10).await.unwrap_err();
        assert!(err.is_selector_syntax());
    }

    #[tokio::test]
    async fn unknown_scope_is_node_not_found() {
        let dom = page();
        let missing: DomPath = "root/9".parse().unwrap();
        let err = dom.query(Some(&missing), "li", 10).await.unwrap_err();
        assert!(matches!(err, DomError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn inspect_reports_child_count() {
        let dom = page();
        let info = dom.inspect(&"root/1/0/0".parse().unwrap()).await.unwrap();
        assert_eq!(info.tag, "ul");
        assert_eq!(info.child_count, 3);
        assert_eq!(info.classes, vec!["feed"]);
        assert!(dom.inspect(&"root/0/0".parse().unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn sessions_lookup() {
        let sessions = MemorySessions::new();
        sessions.insert("s1", Arc::new(page()));
        assert!(sessions.session("s1").await.is_ok());
        let err = sessions.session("nope").await.err().unwrap();
        assert!(matches!(err, DomError::SessionUnavailable(_)));
        assert!(sessions.remove("s1"));
        assert!(sessions.session("s1").await.is_err());
    }
}
