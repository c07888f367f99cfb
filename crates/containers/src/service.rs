//! Request/response surface for match and branch calls.

use std::{collections::BTreeMap, sync::Arc};

use {
    cartograph_dom::{BranchFetcher, DomNode, DomPath, DomSessions, Result as DomResult},
    serde::{Deserialize, Serialize},
    tracing::info,
};

use crate::{
    error::{MatchError, MatchResult},
    library::{Container, LibraryCatalog},
    matcher::{ContainerMatch, ContainerMatcher, ContainerTreeNode, MatchOptions},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub session: String,
    pub url: String,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_children: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshotBody {
    pub container_tree: Vec<ContainerTreeNode>,
    pub dom_tree: DomNode,
    pub matches: BTreeMap<String, ContainerMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResponse {
    /// Definition of the first selected root, if any matched.
    pub container: Option<Container>,
    pub snapshot: MatchSnapshotBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequest {
    pub session: String,
    pub path: DomPath,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_children: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchResponse {
    pub node: DomNode,
}

/// Serves match and branch requests over a session table.
pub struct ContainerService {
    sessions: Arc<dyn DomSessions>,
    catalog: Arc<LibraryCatalog>,
    matcher: ContainerMatcher,
    fetcher: BranchFetcher,
    match_defaults: MatchOptions,
    branch_defaults: MatchOptions,
}

impl ContainerService {
    pub fn new(
        sessions: Arc<dyn DomSessions>,
        catalog: Arc<LibraryCatalog>,
        matcher: ContainerMatcher,
        fetcher: BranchFetcher,
    ) -> Self {
        Self {
            sessions,
            catalog,
            matcher,
            fetcher,
            match_defaults: MatchOptions::default(),
            branch_defaults: MatchOptions {
                max_depth: 2,
                max_children: 50,
            },
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, matching: MatchOptions, branch: MatchOptions) -> Self {
        self.match_defaults = matching;
        self.branch_defaults = branch;
        self
    }

    pub fn catalog(&self) -> &LibraryCatalog {
        &self.catalog
    }

    pub fn matcher(&self) -> &ContainerMatcher {
        &self.matcher
    }

    /// Match the library serving `url` against the session's page.
    ///
    /// `dom_tree` is the page root expanded with the same limits.
    pub async fn handle_match(&self, request: MatchRequest) -> MatchResult<MatchResponse> {
        let library =
            self.catalog
                .for_url(&request.url)
                .ok_or_else(|| MatchError::LibraryNotFound {
                    url: request.url.clone(),
                })?;
        let options = MatchOptions {
            max_depth: request.max_depth.unwrap_or(self.match_defaults.max_depth),
            max_children: request
                .max_children
                .unwrap_or(self.match_defaults.max_children),
        };

        let dom = self.sessions.session(&request.session).await?;
        let snapshot = self
            .matcher
            .match_page(library, dom.as_ref(), options)
            .await?;
        let dom_tree = self
            .fetcher
            .fetch_root(dom.as_ref(), options.max_depth, options.max_children)
            .await?;

        info!(
            session = %request.session,
            library = library.name(),
            root = snapshot.root().unwrap_or("-"),
            matched = snapshot.matches.values().filter(|m| m.matched).count(),
            "match request served"
        );

        let container = snapshot.root().and_then(|id| library.get(id)).cloned();
        Ok(MatchResponse {
            container,
            snapshot: MatchSnapshotBody {
                container_tree: snapshot.container_tree,
                dom_tree,
                matches: snapshot.matches,
            },
        })
    }

    pub async fn handle_branch(&self, request: BranchRequest) -> DomResult<BranchResponse> {
        let dom = self.sessions.session(&request.session).await?;
        let node = self
            .fetcher
            .fetch_branch(
                dom.as_ref(),
                &request.path,
                request.max_depth.unwrap_or(self.branch_defaults.max_depth),
                request
                    .max_children
                    .unwrap_or(self.branch_defaults.max_children),
            )
            .await?;
        Ok(BranchResponse { node })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        cartograph_dom::{
            DomError,
            memory::{Element, MemoryDom, MemorySessions},
        },
        cartograph_events::EventBus,
        serde_json::json,
    };

    fn service() -> ContainerService {
        let sessions = MemorySessions::new();
        sessions.insert(
            "s1",
            Arc::new(MemoryDom::new(Element::new("html").child(
                Element::new("body").child(
                    Element::new("main")
                        .id("app")
                        .children((0..8).map(|_| Element::new("article").class("card"))),
                ),
            ))),
        );
        let catalog = LibraryCatalog::from_json(
            &json!({
                "demo": {
                    "domains": ["demo.test"],
                    "containers": {
                        "demo.app": { "selector": "#app", "children": ["demo.app.card"] },
                        "demo.app.card": { "selector": "article.card" }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();
        ContainerService::new(
            Arc::new(sessions),
            Arc::new(catalog),
            ContainerMatcher::new(Arc::new(EventBus::new())),
            BranchFetcher::default(),
        )
    }

    #[tokio::test]
    async fn match_returns_snapshot_and_dom_tree() {
        let svc = service();
        let resp = svc
            .handle_match(MatchRequest {
                session: "s1".into(),
                url: "https://demo.test/feed".into(),
                max_depth: Some(2),
                max_children: Some(5),
            })
            .await
            .unwrap();

        assert_eq!(resp.container.as_ref().unwrap().id, "demo.app");
        assert_eq!(resp.snapshot.matches["demo.app.card"].nodes.len(), 5);
        assert_eq!(resp.snapshot.matches["demo.app.card"].nodes[0].match_count, 8);
        assert_eq!(resp.snapshot.dom_tree.tag, "html");

        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            v["snapshot"]["matches"]["demo.app"]["nodes"][0]["dom_path"],
            "root/0/0"
        );
    }

    #[tokio::test]
    async fn unknown_session_is_session_unavailable() {
        let err = service()
            .handle_match(MatchRequest {
                session: "gone".into(),
                url: "https://demo.test/".into(),
                max_depth: None,
                max_children: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::SessionUnavailable(ref s) if s == "gone"));
    }

    #[tokio::test]
    async fn unknown_host_is_library_not_found() {
        let err = service()
            .handle_match(MatchRequest {
                session: "s1".into(),
                url: "https://elsewhere.test/".into(),
                max_depth: None,
                max_children: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::LibraryNotFound { .. }));
    }

    #[tokio::test]
    async fn branch_request_round_trip() {
        let svc = service();
        let req: BranchRequest = serde_json::from_value(json!({
            "session": "s1",
            "path": "root/0/0",
            "maxDepth": 1,
            "maxChildren": 3
        }))
        .unwrap();
        let resp = svc.handle_branch(req).await.unwrap();
        assert_eq!(resp.node.child_count, 8);
        assert_eq!(resp.node.children.len(), 3);

        let err = svc
            .handle_branch(BranchRequest {
                session: "s1".into(),
                path: "root/7".parse().unwrap(),
                max_depth: None,
                max_children: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomError::NodeNotFound { .. }));
    }
}
