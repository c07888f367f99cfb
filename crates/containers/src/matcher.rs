//! Resolve a container library against a live page.

use std::{collections::BTreeMap, sync::Arc};

use {
    cartograph_config::{MatcherConfig, RootSelection},
    cartograph_dom::{DomError, DomPath, DomQuery},
    cartograph_events::EventBus,
    futures::future::{BoxFuture, FutureExt},
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::{debug, warn},
};

use crate::{
    error::MatchResult,
    library::{Container, ContainerLibrary},
};

/// Per-call limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    /// Levels of child containers attempted below the roots.
    pub max_depth: usize,
    /// Elements kept per selector.
    pub max_children: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_children: 20,
        }
    }
}

impl From<&MatcherConfig> for MatchOptions {
    fn from(cfg: &MatcherConfig) -> Self {
        Self {
            max_depth: cfg.max_depth,
            max_children: cfg.max_children,
        }
    }
}

/// One element a container resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedNode {
    pub dom_path: DomPath,
    /// The sub-selector that produced the hit.
    pub selector: String,
    /// Total hits for that selector in its scope, before capping.
    pub match_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMatch {
    pub nodes: Vec<MatchedNode>,
    pub matched: bool,
}

/// Attempted containers, shaped like the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTreeNode {
    pub id: String,
    pub matched: bool,
    pub dom_paths: Vec<DomPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContainerTreeNode>,
}

impl ContainerTreeNode {
    /// Pre-order walk.
    pub fn walk(&self) -> Vec<&ContainerTreeNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Selected roots and every container attempted beneath them.
    pub container_tree: Vec<ContainerTreeNode>,
    pub matches: BTreeMap<String, ContainerMatch>,
}

impl MatchSnapshot {
    pub fn is_empty(&self) -> bool {
        self.container_tree.is_empty()
    }

    /// Id of the first selected root.
    pub fn root(&self) -> Option<&str> {
        self.container_tree.first().map(|n| n.id.as_str())
    }

    pub fn matched_ids(&self) -> Vec<&str> {
        self.container_tree
            .iter()
            .flat_map(ContainerTreeNode::walk)
            .filter(|n| n.matched)
            .map(|n| n.id.as_str())
            .collect()
    }
}

/// Selector resolution for one container in one scope.
struct Resolution {
    selector: String,
    paths: Vec<DomPath>,
    total: usize,
}

/// Attempt record built during descent.
struct Attempt {
    id: String,
    /// Stays true even if dedup later hands every node to a child.
    matched: bool,
    nodes: Vec<MatchedNode>,
    /// `None` when descent stopped here.
    children: Option<Vec<Attempt>>,
}

pub struct ContainerMatcher {
    bus: Arc<EventBus>,
    root_selection: RootSelection,
}

impl ContainerMatcher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            root_selection: RootSelection::default(),
        }
    }

    pub fn from_config(bus: Arc<EventBus>, config: &MatcherConfig) -> Self {
        Self::new(bus).with_root_selection(config.root_selection)
    }

    #[must_use]
    pub fn with_root_selection(mut self, policy: RootSelection) -> Self {
        self.root_selection = policy;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Resolve `library` against `dom` and announce what was found.
    ///
    /// Running twice against an unchanged page yields the same snapshot.
    /// A page with no matching root produces an empty snapshot. Only
    /// backend failures (unreachable session, transport) are errors.
    pub async fn match_page(
        &self,
        library: &ContainerLibrary,
        dom: &dyn DomQuery,
        options: MatchOptions,
    ) -> MatchResult<MatchSnapshot> {
        let mut matched_roots = Vec::new();
        for root in library.roots() {
            if let Some(found) = resolve(dom, root, &[None], options.max_children).await? {
                matched_roots.push((root, found));
            }
        }
        let selected = self.select_roots(library, matched_roots);

        let mut attempts = Vec::with_capacity(selected.len());
        for (root, nodes) in selected {
            attempts.push(descend(dom, library, root, nodes, 0, options).await?);
        }

        dedup_shared_paths(&mut attempts);

        let snapshot = MatchSnapshot {
            container_tree: attempts.iter().map(to_tree).collect(),
            matches: attempts.iter().fold(BTreeMap::new(), |mut acc, a| {
                collect_matches(a, &mut acc);
                acc
            }),
        };

        for attempt in &attempts {
            self.announce(library, attempt).await;
        }

        debug!(
            library = library.name(),
            roots = snapshot.container_tree.len(),
            matched = snapshot.matched_ids().len(),
            "container match complete"
        );
        Ok(snapshot)
    }

    fn select_roots<'a>(
        &self,
        library: &ContainerLibrary,
        mut matched: Vec<(&'a Container, Vec<MatchedNode>)>,
    ) -> Vec<(&'a Container, Vec<MatchedNode>)> {
        match self.root_selection {
            RootSelection::All => matched,
            RootSelection::HighestPriority => {
                // Earliest declaration wins ties.
                let best = matched
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, (c, _))| {
                        (c.priority, std::cmp::Reverse(library.position(&c.id)))
                    })
                    .map(|(i, _)| i);
                match best {
                    Some(i) => vec![matched.swap_remove(i)],
                    None => Vec::new(),
                }
            },
        }
    }

    /// Emit lifecycle events in pre-order: `discovered` for a matched
    /// container that kept nodes after dedup, then `children_discovered`
    /// once its subtree is done.
    fn announce<'a>(
        &'a self,
        library: &'a ContainerLibrary,
        attempt: &'a Attempt,
    ) -> BoxFuture<'a, ()> {
        async move {
            // Every node went to a descendant, which announces it instead.
            if attempt.matched && !attempt.nodes.is_empty() {
                let topic = format!("container:{}:discovered", attempt.id);
                let report = self
                    .bus
                    .emit(
                        topic,
                        json!({
                            "containerId": attempt.id,
                            "parentId": library.parent_of(&attempt.id),
                            "nodes": attempt.nodes,
                        }),
                    )
                    .await;
                if !report.is_ok() {
                    debug!(
                        container = %attempt.id,
                        failures = report.failures.len(),
                        "discovered handlers failed"
                    );
                }
            }

            let Some(children) = &attempt.children else {
                return;
            };
            for child in children {
                self.announce(library, child).await;
            }
            if !children.is_empty() {
                let matched: Vec<&str> = children
                    .iter()
                    .filter(|c| c.matched)
                    .map(|c| c.id.as_str())
                    .collect();
                let attempted: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
                self.bus
                    .emit(
                        format!("container:{}:children_discovered", attempt.id),
                        json!({
                            "containerId": attempt.id,
                            "attempted": attempted,
                            "matched": matched,
                        }),
                    )
                    .await;
            }
        }
        .boxed()
    }
}

/// Walk the container's candidates in order; within a comma group the first
/// sub-selector with any hit wins. Each scope is resolved independently and
/// the hits are concatenated, capped at `limit`.
async fn resolve(
    dom: &dyn DomQuery,
    container: &Container,
    scopes: &[Option<&DomPath>],
    limit: usize,
) -> MatchResult<Option<Vec<MatchedNode>>> {
    let mut nodes: Vec<MatchedNode> = Vec::new();
    for scope in scopes {
        if nodes.len() >= limit {
            break;
        }
        let Some(found) = resolve_in_scope(dom, container, *scope, limit).await? else {
            continue;
        };
        for path in found.paths {
            if nodes.len() >= limit {
                break;
            }
            if nodes.iter().any(|n| n.dom_path == path) {
                continue;
            }
            nodes.push(MatchedNode {
                dom_path: path,
                selector: found.selector.clone(),
                match_count: found.total,
            });
        }
    }
    Ok((!nodes.is_empty()).then_some(nodes))
}

async fn resolve_in_scope(
    dom: &dyn DomQuery,
    container: &Container,
    scope: Option<&DomPath>,
    limit: usize,
) -> MatchResult<Option<Resolution>> {
    for group in container.selector_groups() {
        for selector in group {
            match dom.query(scope, selector, limit).await {
                Ok(outcome) if !outcome.is_empty() => {
                    return Ok(Some(Resolution {
                        selector: selector.to_string(),
                        paths: outcome.paths,
                        total: outcome.total,
                    }));
                },
                Ok(_) => {},
                Err(DomError::SelectorSyntax { selector, reason }) => {
                    debug!(
                        container = %container.id,
                        %selector,
                        %reason,
                        "invalid selector treated as no match"
                    );
                },
                Err(DomError::NodeNotFound { path }) => {
                    warn!(container = %container.id, %path, "match scope vanished");
                    return Ok(None);
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(None)
}

fn descend<'a>(
    dom: &'a dyn DomQuery,
    library: &'a ContainerLibrary,
    container: &'a Container,
    nodes: Vec<MatchedNode>,
    depth: usize,
    options: MatchOptions,
) -> BoxFuture<'a, MatchResult<Attempt>> {
    async move {
        if nodes.is_empty() || depth >= options.max_depth {
            return Ok(Attempt {
                id: container.id.clone(),
                matched: !nodes.is_empty(),
                nodes,
                children: None,
            });
        }

        let scopes: Vec<Option<&DomPath>> = nodes.iter().map(|n| Some(&n.dom_path)).collect();
        let mut children = Vec::with_capacity(container.children.len());
        for child_id in &container.children {
            let Some(child) = library.get(child_id) else {
                continue;
            };
            let found = resolve(dom, child, &scopes, options.max_children)
                .await?
                .unwrap_or_default();
            children.push(descend(dom, library, child, found, depth + 1, options).await?);
        }

        Ok(Attempt {
            id: container.id.clone(),
            matched: true,
            nodes,
            children: Some(children),
        })
    }
    .boxed()
}

/// An element matched by a container and any of its descendants stays with
/// the deepest one. Returns every path the subtree matched before dedup.
fn dedup_shared_paths(attempts: &mut [Attempt]) -> Vec<DomPath> {
    let mut seen = Vec::new();
    for attempt in attempts {
        let own: Vec<DomPath> = attempt.nodes.iter().map(|n| n.dom_path.clone()).collect();
        if let Some(children) = attempt.children.as_mut() {
            let claimed = dedup_shared_paths(children);
            attempt.nodes.retain(|n| !claimed.contains(&n.dom_path));
            seen.extend(claimed);
        }
        seen.extend(own);
    }
    seen
}

fn to_tree(attempt: &Attempt) -> ContainerTreeNode {
    ContainerTreeNode {
        id: attempt.id.clone(),
        matched: attempt.matched,
        dom_paths: attempt.nodes.iter().map(|n| n.dom_path.clone()).collect(),
        children: attempt
            .children
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(to_tree)
            .collect(),
    }
}

fn collect_matches(attempt: &Attempt, out: &mut BTreeMap<String, ContainerMatch>) {
    out.insert(attempt.id.clone(), ContainerMatch {
        nodes: attempt.nodes.clone(),
        matched: attempt.matched,
    });
    for child in attempt.children.as_deref().unwrap_or_default() {
        collect_matches(child, out);
    }
}
