#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    cartograph_config::RootSelection,
    cartograph_containers::{ContainerLibrary, ContainerMatcher, MatchError, MatchOptions},
    cartograph_dom::{
        DomError, DomPath, DomQuery, NodeInfo, QueryOutcome,
        memory::{Element, MemoryDom},
    },
    cartograph_events::{EventBus, handler_fn},
    serde_json::{Value, json},
};

fn library(containers: Value) -> ContainerLibrary {
    ContainerLibrary::from_json(
        &json!({ "site": { "domains": ["site.test"], "containers": containers } }).to_string(),
    )
    .unwrap()
}

fn feed_page() -> MemoryDom {
    MemoryDom::new(
        Element::new("html").children([
            Element::new("head"),
            Element::new("body").child(
                Element::new("main").id("app").children([
                    Element::new("header").class("top"),
                    Element::new("section").class("feed").children([
                        Element::new("article").class("post").child(Element::new("footer")),
                        Element::new("article").class("post").child(Element::new("footer")),
                        Element::new("article").class("post").child(Element::new("footer")),
                    ]),
                ]),
            ),
        ]),
    )
}

fn feed_library() -> ContainerLibrary {
    library(json!({
        "site.home": {
            "selector": "#app",
            "children": ["site.home.header", "site.home.feed"]
        },
        "site.home.header": { "selector": "header.top" },
        "site.home.feed": {
            "selectors": [".missing", "section.feed"],
            "children": ["site.home.feed.post"]
        },
        "site.home.feed.post": {
            "selector": "article.post",
            "children": ["site.home.feed.post.footer"]
        },
        "site.home.feed.post.footer": { "selector": "footer" }
    }))
}

fn paths(snapshot: &cartograph_containers::MatchSnapshot, id: &str) -> Vec<String> {
    snapshot.matches[id]
        .nodes
        .iter()
        .map(|n| n.dom_path.to_string())
        .collect()
}

#[tokio::test]
async fn resolves_nested_containers() {
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&feed_library(), &feed_page(), MatchOptions::default())
        .await
        .unwrap();

    assert_eq!(snap.root(), Some("site.home"));
    assert_eq!(paths(&snap, "site.home"), vec!["root/1/0"]);
    assert_eq!(paths(&snap, "site.home.feed"), vec!["root/1/0/1"]);
    assert_eq!(snap.matches["site.home.feed"].nodes[0].selector, "section.feed");
    assert_eq!(paths(&snap, "site.home.feed.post"), vec![
        "root/1/0/1/0",
        "root/1/0/1/1",
        "root/1/0/1/2",
    ]);
    assert_eq!(paths(&snap, "site.home.feed.post.footer"), vec![
        "root/1/0/1/0/0",
        "root/1/0/1/1/0",
        "root/1/0/1/2/0",
    ]);
    assert_eq!(snap.matched_ids(), vec![
        "site.home",
        "site.home.header",
        "site.home.feed",
        "site.home.feed.post",
        "site.home.feed.post.footer",
    ]);
}

#[tokio::test]
async fn matching_is_idempotent() {
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let (lib, dom) = (feed_library(), feed_page());
    let a = matcher
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();
    let b = matcher
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(a.container_tree, b.container_tree);
    assert_eq!(a.matches, b.matches);
}

#[tokio::test]
async fn fallback_group_records_winning_selector() {
    let lib = library(json!({
        "x": { "selector": "nav, section.feed, aside" }
    }));
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(snap.matches["x"].nodes[0].selector, "section.feed");
}

#[tokio::test]
async fn invalid_selector_is_no_match() {
    let lib = library(json!({
        "x": { "selectors": ["article:hover", "section.feed"] },
    }));
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(snap.matches["x"].nodes[0].selector, "section.feed");
}

#[tokio::test]
async fn child_wins_shared_path() {
    let dom = MemoryDom::new(
        Element::new("html").children([Element::new("head"), Element::new("body").class("c")]),
    );
    let lib = library(json!({
        "P": { "selector": "body", "children": ["P.c"] },
        "P.c": { "selector": ".c" }
    }));
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();

    assert_eq!(paths(&snap, "P.c"), vec!["root/1"]);
    assert!(paths(&snap, "P").is_empty());
    assert!(snap.matches["P"].matched);
}

#[tokio::test]
async fn deepest_descendant_wins_shared_path() {
    let dom = MemoryDom::new(
        Element::new("html").children([Element::new("head"), Element::new("body").class("c")]),
    );
    let lib = library(json!({
        "P": { "selector": "body", "children": ["P.c"] },
        "P.c": { "selector": ".c", "children": ["P.c.g"] },
        "P.c.g": { "selector": "body.c" }
    }));
    let bus = Arc::new(EventBus::new());
    let snap = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();

    assert_eq!(paths(&snap, "P.c.g"), vec!["root/1"]);
    assert!(paths(&snap, "P.c").is_empty());
    assert!(paths(&snap, "P").is_empty());
    assert!(snap.matches["P"].matched);
    assert!(snap.matches["P.c"].matched);

    let announced: Vec<String> = bus
        .history_matching(&"container:*:discovered".parse().unwrap())
        .into_iter()
        .map(|e| e.topic)
        .collect();
    assert_eq!(announced, vec!["container:P.c.g:discovered"]);
}

#[tokio::test]
async fn parent_without_own_nodes_is_not_announced() {
    let dom = MemoryDom::new(
        Element::new("html").children([Element::new("head"), Element::new("body").class("c")]),
    );
    let lib = library(json!({
        "P": { "selector": "body", "children": ["P.c"] },
        "P.c": { "selector": ".c" }
    }));
    let bus = Arc::new(EventBus::new());
    let parent_hits = Arc::new(Mutex::new(0usize));
    let hits = Arc::clone(&parent_hits);
    bus.on(
        "container:P:discovered",
        handler_fn("count-parent", move |_event| {
            let hits = Arc::clone(&hits);
            async move {
                *hits.lock().unwrap() += 1;
                Ok(())
            }
        }),
    )
    .unwrap();

    let snap = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();

    assert!(snap.matches["P"].matched);
    assert_eq!(*parent_hits.lock().unwrap(), 0);
    assert_eq!(bus.history_matching(&"container:P.c:discovered".parse().unwrap()).len(), 1);
    assert!(bus.history_matching(&"error".parse().unwrap()).is_empty());
}

#[tokio::test]
async fn no_matching_root_is_empty_result() {
    let lib = library(json!({ "x": { "selector": "table" } }));
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();
    assert!(snap.is_empty());
    assert!(snap.matches.is_empty());
}

#[tokio::test]
async fn highest_priority_root_wins_and_ties_keep_declaration_order() {
    let lib = library(json!({
        "a": { "selector": "body" },
        "b": { "selector": "main", "priority": 2 },
        "c": { "selector": "section", "priority": 2 }
    }));
    let bus = Arc::new(EventBus::new());
    let snap = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(snap.root(), Some("b"));
    assert_eq!(snap.container_tree.len(), 1);

    let all = ContainerMatcher::new(bus)
        .with_root_selection(RootSelection::All)
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();
    let roots: Vec<_> = all.container_tree.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(roots, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn depth_and_breadth_limits() {
    let matcher = ContainerMatcher::new(Arc::new(EventBus::new()));
    let snap = matcher
        .match_page(&feed_library(), &feed_page(), MatchOptions {
            max_depth: 2,
            max_children: 2,
        })
        .await
        .unwrap();
    assert_eq!(paths(&snap, "site.home.feed.post").len(), 2);
    assert_eq!(snap.matches["site.home.feed.post"].nodes[0].match_count, 3);
    assert!(!snap.matches.contains_key("site.home.feed.post.footer"));
}

#[tokio::test]
async fn emits_lifecycle_events_in_tree_order() {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on(
        "container:*:*",
        handler_fn("recorder", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(event.topic);
                anyhow::Ok(())
            }
        }),
    )
    .unwrap();

    let lib = library(json!({
        "p": { "selector": "main", "children": ["p.head", "p.feed", "p.none"] },
        "p.head": { "selector": "header" },
        "p.feed": { "selector": "section" },
        "p.none": { "selector": "table" }
    }));
    ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &feed_page(), MatchOptions::default())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![
        "container:p:discovered",
        "container:p.head:discovered",
        "container:p.feed:discovered",
        "container:p:children_discovered",
    ]);

    let discovered = bus.history_matching(&"container:p.feed:discovered".parse().unwrap());
    assert_eq!(discovered[0].payload["parentId"], "p");
    assert_eq!(discovered[0].payload["nodes"][0]["dom_path"], "root/1/0/1");
}

struct Unreachable;

#[async_trait]
impl DomQuery for Unreachable {
    async fn query(
        &self,
        _scope: Option<&DomPath>,
        _selector: &str,
        _limit: usize,
    ) -> cartograph_dom::Result<QueryOutcome> {
        Err(DomError::SessionUnavailable("tab-1".into()))
    }

    async fn inspect(&self, _path: &DomPath) -> cartograph_dom::Result<NodeInfo> {
        Err(DomError::SessionUnavailable("tab-1".into()))
    }
}

#[tokio::test]
async fn unreachable_page_surfaces_session_unavailable() {
    let bus = Arc::new(EventBus::new());
    let err = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&feed_library(), &Unreachable, MatchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::SessionUnavailable(_)));
    assert!(bus.history().is_empty());
}
