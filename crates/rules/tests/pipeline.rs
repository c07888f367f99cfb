#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Matcher → bus → bindings/workflows, end to end over an in-memory page.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    cartograph_containers::{ContainerLibrary, ContainerMatcher, MatchOptions},
    cartograph_dom::memory::{Element, MemoryDom},
    cartograph_events::{EventBus, TopicPattern},
    cartograph_rules::{
        BindingRegistry, EvaluationOutcome, OperationExecutor, OperationOutcome,
        OperationRequest, OperationType, WorkflowEngine, WorkflowRule,
    },
    serde_json::json,
};

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<OperationRequest>>,
}

#[async_trait]
impl OperationExecutor for Recorder {
    async fn execute(&self, request: &OperationRequest) -> anyhow::Result<OperationOutcome> {
        self.calls.lock().unwrap().push(request.clone());
        if request.operation_type == OperationType::Click {
            anyhow::bail!("element is not clickable");
        }
        Ok(OperationOutcome {
            affected: request.target.dom_paths.len(),
            data: serde_json::Value::Null,
        })
    }
}

fn page() -> MemoryDom {
    MemoryDom::new(
        Element::new("html").child(
            Element::new("body").child(
                Element::new("div").class("feed").children([
                    Element::new("div").class("card"),
                    Element::new("div").class("card"),
                ]),
            ),
        ),
    )
}

fn library() -> ContainerLibrary {
    ContainerLibrary::from_json(
        &json!({
            "demo": {
                "domains": ["demo.test"],
                "containers": {
                    "demo.feed": {
                        "selector": ".feed",
                        "children": ["demo.feed.card"],
                        "operations": [
                            { "id": "outline", "triggerEvents": ["discovered"], "operationType": "highlight" },
                            { "id": "open", "triggerEvents": ["children_discovered"], "operationType": "click" }
                        ]
                    },
                    "demo.feed.card": {
                        "selector": ".card",
                        "operations": [
                            { "id": "grab", "operationType": "extract", "config": { "fields": ["text"] } }
                        ]
                    }
                }
            }
        })
        .to_string(),
    )
    .unwrap()
}

#[tokio::test]
async fn discovered_containers_drive_bindings_and_workflows() {
    let bus = Arc::new(EventBus::new());
    let recorder = Arc::new(Recorder::default());
    let registry = BindingRegistry::new(Arc::clone(&bus), recorder.clone()).unwrap();
    let lib = library();
    assert_eq!(registry.register_library_operations(&lib).unwrap(), 3);

    let engine = WorkflowEngine::new(Arc::clone(&bus));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine
        .add_rule(WorkflowRule::new(
            "log-cards",
            "container:demo.feed.card:discovered",
            move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    let count = event.payload["nodes"].as_array().map_or(0, Vec::len);
                    sink.lock().unwrap().push(count);
                    anyhow::Ok(())
                }
            },
        ))
        .unwrap();

    let snapshot = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &page(), MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(snapshot.matched_ids(), vec!["demo.feed", "demo.feed.card"]);

    let calls = recorder.calls.lock().unwrap().clone();
    let ops: Vec<_> = calls
        .iter()
        .map(|c| (c.target.container_id.clone().unwrap(), c.operation_type))
        .collect();
    assert_eq!(ops, vec![
        ("demo.feed".to_string(), OperationType::Highlight),
        ("demo.feed.card".to_string(), OperationType::Extract),
        ("demo.feed".to_string(), OperationType::Click),
    ]);
    assert_eq!(calls[1].target.dom_paths.len(), 2);
    assert_eq!(calls[1].config["fields"][0], "text");

    assert_eq!(*seen.lock().unwrap(), vec![2]);
    let evals = engine.get_rule_evaluations();
    assert_eq!(evals["log-cards"][0].outcome, EvaluationOutcome::Success);

    // The failing click is isolated and recorded as an error event.
    let errors = bus.history_matching(&TopicPattern::parse("error").unwrap());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["topic"], "container:demo.feed:children_discovered");
    assert_eq!(errors[0].payload["handler"], "binding:demo.feed#open@children_discovered");
}

#[tokio::test]
async fn disabled_workflow_skips_while_bindings_still_fire() {
    let bus = Arc::new(EventBus::new());
    let recorder = Arc::new(Recorder::default());
    let registry = BindingRegistry::new(Arc::clone(&bus), recorder.clone()).unwrap();
    let lib = library();
    registry.register_library_operations(&lib).unwrap();

    let engine = WorkflowEngine::new(Arc::clone(&bus));
    engine
        .add_rule(
            WorkflowRule::new("noop", "container:*:discovered", |_event| async {
                anyhow::Ok(())
            })
            .disabled(),
        )
        .unwrap();

    ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &page(), MatchOptions::default())
        .await
        .unwrap();

    let outcomes: Vec<_> = engine.get_rule_evaluations()["noop"]
        .iter()
        .map(|e| e.outcome.clone())
        .collect();
    assert_eq!(outcomes, vec![EvaluationOutcome::SkippedDisabled; 2]);
    assert_eq!(recorder.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn shared_element_highlights_once_without_errors() {
    let bus = Arc::new(EventBus::new());
    let recorder = Arc::new(Recorder::default());
    let registry = BindingRegistry::new(Arc::clone(&bus), recorder.clone()).unwrap();
    let lib = ContainerLibrary::from_json(
        &json!({
            "demo": {
                "containers": {
                    "P": {
                        "selector": "body",
                        "children": ["P.c"],
                        "operations": [
                            { "id": "hl", "triggerEvents": ["discovered"], "operationType": "highlight" }
                        ]
                    },
                    "P.c": {
                        "selector": ".c",
                        "operations": [
                            { "id": "hl", "triggerEvents": ["discovered"], "operationType": "highlight" }
                        ]
                    }
                }
            }
        })
        .to_string(),
    )
    .unwrap();
    registry.register_library_operations(&lib).unwrap();

    let dom = MemoryDom::new(Element::new("html").child(Element::new("body").class("c")));
    let snapshot = ContainerMatcher::new(Arc::clone(&bus))
        .match_page(&lib, &dom, MatchOptions::default())
        .await
        .unwrap();
    assert!(snapshot.matches["P"].matched);

    let calls = recorder.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target.container_id.as_deref(), Some("P.c"));
    assert_eq!(calls[0].target.dom_paths[0].to_string(), "root/0");
    assert!(bus.history_matching(&TopicPattern::parse("error").unwrap()).is_empty());
}
