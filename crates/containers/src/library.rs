//! Container library documents.
//!
//! ```json
//! {
//!   "weibo": {
//!     "domains": ["weibo.com"],
//!     "containers": {
//!       "weibo.home": { "selector": "#app", "children": ["weibo.home.feed"] },
//!       "weibo.home.feed": { "selectors": ["main .feed, .Feed_body"] }
//!     }
//!   }
//! }
//! ```
//!
//! Declaration order is preserved and breaks root-priority ties.

use std::{collections::HashMap, path::Path};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::error::{LibraryError, LibraryResult};

/// An operation a container declares for its lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOperation {
    pub id: String,
    /// Short event names (`discovered`) or full topic patterns.
    #[serde(default)]
    pub trigger_events: Vec<String>,
    pub operation_type: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Candidates in evaluation order. Each may be a comma-separated
    /// fallback group.
    pub selectors: Vec<String>,
    pub children: Vec<String>,
    pub operations: Vec<ContainerOperation>,
    /// Used to pick among several matching roots. Higher wins.
    pub priority: i64,
}

impl Container {
    /// Candidate groups, each split into its fallback sub-selectors.
    pub fn selector_groups(&self) -> impl Iterator<Item = Vec<&str>> {
        self.selectors.iter().map(|s| split_group(s))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContainer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    selectors: Vec<String>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    operations: Vec<ContainerOperation>,
    #[serde(default)]
    priority: i64,
}

#[derive(Deserialize)]
struct RawLibrary {
    #[serde(default)]
    domains: Vec<String>,
    containers: Map<String, Value>,
}

/// A validated container forest.
#[derive(Debug, Clone)]
pub struct ContainerLibrary {
    name: String,
    domains: Vec<String>,
    containers: Vec<Container>,
    index: HashMap<String, usize>,
    parents: HashMap<String, String>,
}

impl ContainerLibrary {
    /// Build and validate a library.
    ///
    /// Fails on containers without selectors, unknown or doubly-claimed
    /// children, and cycles.
    pub fn new(
        name: impl Into<String>,
        domains: Vec<String>,
        containers: Vec<Container>,
    ) -> LibraryResult<Self> {
        let index: HashMap<String, usize> = containers
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut parents: HashMap<String, String> = HashMap::new();
        for container in &containers {
            if container.selectors.iter().all(|s| s.trim().is_empty()) {
                return Err(LibraryError::NoSelectors {
                    id: container.id.clone(),
                });
            }
            for child in &container.children {
                if !index.contains_key(child) {
                    return Err(LibraryError::UnknownChild {
                        parent: container.id.clone(),
                        child: child.clone(),
                    });
                }
                if let Some(first) = parents.insert(child.clone(), container.id.clone()) {
                    return Err(LibraryError::DuplicateParent {
                        child: child.clone(),
                        first,
                        second: container.id.clone(),
                    });
                }
            }
        }

        // With at most one parent per node, a cycle is a parent chain that
        // returns to its start.
        for container in &containers {
            let mut chain = vec![container.id.clone()];
            let mut current = &container.id;
            while let Some(parent) = parents.get(current) {
                if parent == &container.id {
                    chain.push(parent.clone());
                    chain.reverse();
                    return Err(LibraryError::Cycle { cycle: chain });
                }
                if chain.len() > containers.len() {
                    break;
                }
                chain.push(parent.clone());
                current = parent;
            }
        }

        Ok(Self {
            name: name.into(),
            domains,
            containers,
            index,
            parents,
        })
    }

    /// Parse a document holding exactly one library.
    pub fn from_json(json: &str) -> LibraryResult<Self> {
        let mut catalog = LibraryCatalog::from_json(json)?;
        if catalog.libraries.len() != 1 {
            return Err(LibraryError::Format(format!(
                "expected one library, found {}",
                catalog.libraries.len()
            )));
        }
        catalog
            .libraries
            .pop()
            .ok_or_else(|| LibraryError::Format("empty document".into()))
    }

    /// Parse one library body (`{domains, containers}`).
    pub fn from_value(name: &str, body: Value) -> LibraryResult<Self> {
        let raw: RawLibrary = serde_json::from_value(body)?;
        let mut containers = Vec::with_capacity(raw.containers.len());
        for (id, value) in raw.containers {
            let def: RawContainer = serde_json::from_value(value)
                .map_err(|e| LibraryError::Format(format!("container '{id}': {e}")))?;
            let mut selectors = Vec::new();
            if let Some(selector) = def.selector {
                selectors.push(selector);
            }
            selectors.extend(def.selectors);
            containers.push(Container {
                id,
                name: def.name,
                selectors,
                children: def.children,
                operations: def.operations,
                priority: def.priority,
            });
        }
        Self::new(name, raw.domains, containers)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// All containers in declaration order.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn get(&self, id: &str) -> Option<&Container> {
        self.index.get(id).map(|&i| &self.containers[i])
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// Containers never listed as a child, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &Container> {
        self.containers
            .iter()
            .filter(|c| !self.parents.contains_key(&c.id))
    }

    /// Ancestor ids of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Declaration position, used for deterministic tie-breaking.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether this library applies to `host` (exact or subdomain match).
    pub fn serves_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            let domain = domain.trim_start_matches("*.").to_ascii_lowercase();
            host == domain
                || host
                    .strip_suffix(&domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Every library from one or more documents.
#[derive(Debug, Clone, Default)]
pub struct LibraryCatalog {
    libraries: Vec<ContainerLibrary>,
}

impl LibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> LibraryResult<Self> {
        let doc: Map<String, Value> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (name, body) in doc {
            let library = ContainerLibrary::from_value(&name, body)?;
            debug!(library = %name, containers = library.len(), "loaded container library");
            catalog.libraries.push(library);
        }
        Ok(catalog)
    }

    /// Load and merge every file in `paths`.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> LibraryResult<Self> {
        let mut catalog = Self::new();
        for path in paths {
            let path = path.as_ref();
            let raw = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            catalog.extend(Self::from_json(&raw)?);
        }
        Ok(catalog)
    }

    pub fn push(&mut self, library: ContainerLibrary) {
        self.libraries.push(library);
    }

    pub fn extend(&mut self, other: LibraryCatalog) {
        self.libraries.extend(other.libraries);
    }

    pub fn libraries(&self) -> &[ContainerLibrary] {
        &self.libraries
    }

    pub fn get(&self, name: &str) -> Option<&ContainerLibrary> {
        self.libraries.iter().find(|l| l.name == name)
    }

    /// First library whose domains cover the URL's host.
    pub fn for_url(&self, raw_url: &str) -> Option<&ContainerLibrary> {
        let parsed = url::Url::parse(raw_url).ok()?;
        let host = parsed.host_str()?;
        self.libraries.iter().find(|l| l.serves_host(host))
    }
}

/// Split a fallback group on top-level commas, ignoring commas inside
/// brackets, parentheses and quotes.
fn split_group(group: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in group.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {},
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(group[start..i].trim());
                start = i + 1;
            },
            _ => {},
        }
    }
    parts.push(group[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn doc(containers: Value) -> String {
        json!({ "site": { "domains": ["example.com"], "containers": containers } }).to_string()
    }

    #[test]
    fn parses_and_preserves_declaration_order() {
        let lib = ContainerLibrary::from_json(&doc(json!({
            "site.page": { "selector": "#app", "children": ["site.page.list", "site.page.aside"] },
            "site.page.list": {
                "selectors": [".list", "ul"],
                "operations": [{
                    "id": "hl",
                    "triggerEvents": ["discovered"],
                    "operationType": "highlight",
                    "config": { "color": "red" }
                }]
            },
            "site.page.aside": { "selector": "aside" },
            "site.other": { "selector": "body", "priority": 5 }
        })))
        .unwrap();

        assert_eq!(lib.name(), "site");
        let ids: Vec<_> = lib.containers().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["site.page", "site.page.list", "site.page.aside", "site.other"]);
        let roots: Vec<_> = lib.roots().map(|c| c.id.as_str()).collect();
        assert_eq!(roots, vec!["site.page", "site.other"]);
        assert_eq!(lib.parent_of("site.page.aside"), Some("site.page"));
        assert_eq!(lib.parent_of("site.page"), None);
        assert_eq!(lib.get("site.other").unwrap().priority, 5);

        let list = lib.get("site.page.list").unwrap();
        assert_eq!(list.selectors, vec![".list", "ul"]);
        assert_eq!(list.operations[0].trigger_events, vec!["discovered"]);
        assert_eq!(list.operations[0].config["color"], "red");
    }

    #[test]
    fn ancestors_nearest_first() {
        let lib = ContainerLibrary::from_json(&doc(json!({
            "a": { "selector": "html", "children": ["a.b"] },
            "a.b": { "selector": "body", "children": ["a.b.c"] },
            "a.b.c": { "selector": "main" }
        })))
        .unwrap();
        assert_eq!(lib.ancestors("a.b.c"), vec!["a.b", "a"]);
        assert!(lib.ancestors("a").is_empty());
    }

    #[test]
    fn cycle_fails_at_load() {
        let err = ContainerLibrary::from_json(&doc(json!({
            "root": { "selector": "html" },
            "x": { "selector": "div", "children": ["y"] },
            "y": { "selector": "p", "children": ["x"] }
        })))
        .unwrap_err();
        assert!(matches!(err, LibraryError::Cycle { ref cycle } if cycle.len() == 3));
    }

    #[test]
    fn self_reference_is_cycle() {
        let err = ContainerLibrary::from_json(&doc(json!({
            "x": { "selector": "div", "children": ["x"] }
        })))
        .unwrap_err();
        assert!(matches!(err, LibraryError::Cycle { .. }));
    }

    #[test]
    fn unknown_child_fails() {
        let err = ContainerLibrary::from_json(&doc(json!({
            "x": { "selector": "div", "children": ["ghost"] }
        })))
        .unwrap_err();
        assert!(matches!(err, LibraryError::UnknownChild { ref child, .. } if child == "ghost"));
    }

    #[test]
    fn child_with_two_parents_fails() {
        let err = ContainerLibrary::from_json(&doc(json!({
            "a": { "selector": "div", "children": ["c"] },
            "b": { "selector": "p", "children": ["c"] },
            "c": { "selector": "span" }
        })))
        .unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateParent { .. }));
    }

    #[test]
    fn container_without_selectors_fails() {
        let err = ContainerLibrary::from_json(&doc(json!({ "a": { "children": [] } }))).unwrap_err();
        assert!(matches!(err, LibraryError::NoSelectors { .. }));
    }

    #[rstest]
    #[case("a, b, c", vec!["a", "b", "c"])]
    #[case("div.x", vec!["div.x"])]
    #[case("[data-x=\"1,2\"], p", vec!["[data-x=\"1,2\"]", "p"])]
    #[case(" a ,, b ", vec!["a", "b"])]
    fn splits_fallback_groups(#[case] group: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_group(group), expected);
    }

    #[rstest]
    #[case("https://example.com/home", true)]
    #[case("https://m.example.com/", true)]
    #[case("https://notexample.com/", false)]
    #[case("not a url", false)]
    fn catalog_selects_by_host(#[case] url: &str, #[case] found: bool) {
        let catalog = LibraryCatalog::from_json(&doc(json!({ "a": { "selector": "html" } }))).unwrap();
        assert_eq!(catalog.for_url(url).is_some(), found);
    }
}
