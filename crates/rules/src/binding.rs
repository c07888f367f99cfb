//! Declarative trigger → operation bindings.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, RwLock},
};

use {
    anyhow::Context,
    async_trait::async_trait,
    cartograph_containers::ContainerLibrary,
    cartograph_dom::DomPath,
    cartograph_events::{Event, EventBus, EventError, EventHandler, SubscriptionId},
    serde_json::Value,
    tracing::{debug, info},
};

use crate::{
    error::{Result, RuleError},
    operation::{OperationExecutor, OperationRequest, OperationTarget, OperationType},
};

/// Computes a target from the triggering event.
pub type TargetResolver = Arc<dyn Fn(&Event) -> Option<OperationTarget> + Send + Sync>;

#[derive(Clone)]
pub enum BindingTarget {
    /// A fixed container. Paths come from the triggering event when it is
    /// about this container, otherwise from the latest discovery.
    Container(String),
    /// Whatever container was discovered most recently.
    LastDiscovered,
    Resolver(TargetResolver),
}

impl fmt::Debug for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(id) => f.debug_tuple("Container").field(id).finish(),
            Self::LastDiscovered => f.write_str("LastDiscovered"),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingAction {
    pub operation_type: OperationType,
    pub config: Value,
}

#[derive(Debug, Clone)]
pub struct BindingRule {
    pub id: String,
    /// Topic pattern, `*` matching one segment.
    pub trigger: String,
    pub target: BindingTarget,
    pub action: BindingAction,
}

impl BindingRule {
    pub fn new(
        id: impl Into<String>,
        trigger: impl Into<String>,
        target: BindingTarget,
        operation_type: OperationType,
        config: Value,
    ) -> Self {
        Self {
            id: id.into(),
            trigger: trigger.into(),
            target,
            action: BindingAction {
                operation_type,
                config,
            },
        }
    }
}

// ── Discovery state ─────────────────────────────────────────────────────────

/// Latest container discoveries, fed from `container:*:discovered`.
#[derive(Debug, Default)]
pub struct DiscoveryState {
    inner: RwLock<DiscoveryInner>,
}

#[derive(Debug, Default)]
struct DiscoveryInner {
    last: Option<String>,
    nodes: HashMap<String, Vec<DomPath>>,
}

impl DiscoveryState {
    pub fn last_discovered(&self) -> Option<String> {
        self.read().last.clone()
    }

    pub fn nodes(&self, container_id: &str) -> Vec<DomPath> {
        self.read()
            .nodes
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record(&self, container_id: &str, nodes: Vec<DomPath>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.last = Some(container_id.to_string());
        inner.nodes.insert(container_id.to_string(), nodes);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DiscoveryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Container id and node paths carried by a `discovered` payload.
fn discovered_payload(event: &Event) -> Option<(String, Vec<DomPath>)> {
    let id = event
        .payload
        .get("containerId")
        .and_then(Value::as_str)
        .or_else(|| event.segment(1))?
        .to_string();
    let nodes = event
        .payload
        .get("nodes")
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| n.get("dom_path")?.as_str()?.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    Some((id, nodes))
}

struct DiscoveryTracker {
    state: Arc<DiscoveryState>,
}

#[async_trait]
impl EventHandler for DiscoveryTracker {
    fn name(&self) -> &str {
        "discovery-tracker"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        if let Some((id, nodes)) = discovered_payload(event) {
            self.state.record(&id, nodes);
        }
        Ok(())
    }
}

// ── Binding handler ─────────────────────────────────────────────────────────

struct BindingHandler {
    name: String,
    rule: BindingRule,
    executor: Arc<dyn OperationExecutor>,
    discovery: Arc<DiscoveryState>,
}

impl BindingHandler {
    fn resolve_target(&self, event: &Event) -> Option<OperationTarget> {
        match &self.rule.target {
            BindingTarget::Container(id) => {
                let nodes = match discovered_payload(event) {
                    Some((event_id, nodes)) if &event_id == id && !nodes.is_empty() => nodes,
                    _ => self.discovery.nodes(id),
                };
                (!nodes.is_empty()).then(|| OperationTarget::container(id.clone(), nodes))
            },
            BindingTarget::LastDiscovered => {
                let id = self.discovery.last_discovered()?;
                let nodes = self.discovery.nodes(&id);
                Some(OperationTarget::container(id, nodes))
            },
            BindingTarget::Resolver(resolve) => resolve(event),
        }
    }
}

#[async_trait]
impl EventHandler for BindingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let target = self
            .resolve_target(event)
            .filter(|t| !t.is_empty())
            .with_context(|| format!("binding '{}' could not resolve a target", self.rule.id))?;
        let request = OperationRequest {
            operation_type: self.rule.action.operation_type,
            config: self.rule.action.config.clone(),
            target,
        };
        let outcome = self
            .executor
            .execute(&request)
            .await
            .with_context(|| {
                format!("binding '{}' {} failed", self.rule.id, request.operation_type)
            })?;
        debug!(
            binding = %self.rule.id,
            topic = %event.topic,
            operation = %request.operation_type,
            affected = outcome.affected,
            "binding executed"
        );
        Ok(())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

struct Registered {
    rule: BindingRule,
    subscription: SubscriptionId,
}

/// Owns binding rules and their bus subscriptions.
///
/// Dropping the registry unsubscribes everything it registered.
pub struct BindingRegistry {
    bus: Arc<EventBus>,
    executor: Arc<dyn OperationExecutor>,
    discovery: Arc<DiscoveryState>,
    tracker: SubscriptionId,
    rules: Mutex<Vec<Registered>>,
}

impl BindingRegistry {
    pub fn new(bus: Arc<EventBus>, executor: Arc<dyn OperationExecutor>) -> Result<Self> {
        let discovery = Arc::new(DiscoveryState::default());
        let tracker = bus.on(
            "container:*:discovered",
            Arc::new(DiscoveryTracker {
                state: Arc::clone(&discovery),
            }),
        )?;
        Ok(Self {
            bus,
            executor,
            discovery,
            tracker,
            rules: Mutex::new(Vec::new()),
        })
    }

    pub fn discovery(&self) -> &Arc<DiscoveryState> {
        &self.discovery
    }

    /// Register `rule`, replacing any rule with the same id.
    ///
    /// Replacement swaps the bus subscription in one step, so an emit sees
    /// either the old rule or the new one, never both.
    pub fn register(&self, rule: BindingRule) -> Result<()> {
        if rule.id.trim().is_empty() {
            return Err(RuleError::validation("binding id must not be empty"));
        }
        let handler = Arc::new(BindingHandler {
            name: format!("binding:{}", rule.id),
            rule: rule.clone(),
            executor: Arc::clone(&self.executor),
            discovery: Arc::clone(&self.discovery),
        });

        let mut rules = self.lock_rules();
        let existing = rules.iter().position(|r| r.rule.id == rule.id);
        let subscription = match existing {
            Some(pos) => self
                .bus
                .replace(rules[pos].subscription, &rule.trigger, handler),
            None => self.bus.on(&rule.trigger, handler),
        }
        .map_err(pattern_error)?;

        info!(
            binding = %rule.id,
            trigger = %rule.trigger,
            replaced = existing.is_some(),
            "binding registered"
        );
        let entry = Registered { rule, subscription };
        match existing {
            Some(pos) => rules[pos] = entry,
            None => rules.push(entry),
        }
        Ok(())
    }

    /// Remove a rule. Unknown ids are a no-op; returns whether one was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut rules = self.lock_rules();
        let Some(pos) = rules.iter().position(|r| r.rule.id == id) else {
            return false;
        };
        let removed = rules.remove(pos);
        self.bus.off(removed.subscription);
        info!(binding = %id, "binding unregistered");
        true
    }

    /// Registered rules in registration order.
    pub fn rules(&self) -> Vec<BindingRule> {
        self.lock_rules().iter().map(|r| r.rule.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock_rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_rules().is_empty()
    }

    /// Turn every declared container operation into a binding.
    ///
    /// Short trigger names expand to `container:<id>:<name>`; names that
    /// already contain `:` are used as patterns. Operations without
    /// triggers fire on `discovered`. Binding ids are
    /// `<container>#<operation>@<trigger>`.
    pub fn register_library_operations(&self, library: &ContainerLibrary) -> Result<usize> {
        // Validate everything before registering anything.
        let mut pending = Vec::new();
        for container in library.containers() {
            for op in &container.operations {
                let operation_type: OperationType = op.operation_type.parse()?;
                let triggers = if op.trigger_events.is_empty() {
                    vec!["discovered".to_string()]
                } else {
                    op.trigger_events.clone()
                };
                for trigger in triggers {
                    let pattern = if trigger.contains(':') {
                        trigger.clone()
                    } else {
                        format!("container:{}:{trigger}", container.id)
                    };
                    pending.push(BindingRule::new(
                        format!("{}#{}@{trigger}", container.id, op.id),
                        pattern,
                        BindingTarget::Container(container.id.clone()),
                        operation_type,
                        op.config.clone(),
                    ));
                }
            }
        }

        let count = pending.len();
        for rule in pending {
            self.register(rule)?;
        }
        debug!(library = library.name(), count, "library operations bound");
        Ok(count)
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Registered>> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for BindingRegistry {
    fn drop(&mut self) {
        self.bus.off(self.tracker);
        for entry in self.lock_rules().drain(..) {
            self.bus.off(entry.subscription);
        }
    }
}

fn pattern_error(err: EventError) -> RuleError {
    match err {
        EventError::InvalidPattern { pattern, reason } => {
            RuleError::validation(format!("invalid trigger '{pattern}': {reason}"))
        },
        other => RuleError::Event(other),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::operation::OperationOutcome,
        serde_json::json,
    };

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<OperationRequest>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<OperationRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationExecutor for Recorder {
        async fn execute(&self, request: &OperationRequest) -> anyhow::Result<OperationOutcome> {
            self.calls.lock().unwrap().push(request.clone());
            Ok(OperationOutcome {
                affected: request.target.dom_paths.len(),
                data: Value::Null,
            })
        }
    }

    fn setup() -> (Arc<EventBus>, Arc<Recorder>, BindingRegistry) {
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(Recorder::default());
        let registry = BindingRegistry::new(Arc::clone(&bus), recorder.clone()).unwrap();
        (bus, recorder, registry)
    }

    fn discovered(id: &str, paths: &[&str]) -> (String, Value) {
        let nodes: Vec<_> = paths
            .iter()
            .map(|p| json!({ "dom_path": p, "selector": "x", "match_count": 1 }))
            .collect();
        (
            format!("container:{id}:discovered"),
            json!({ "containerId": id, "nodes": nodes }),
        )
    }

    #[tokio::test]
    async fn fixed_container_target_uses_event_nodes() {
        let (bus, recorder, registry) = setup();
        registry
            .register(BindingRule::new(
                "hl",
                "container:feed:discovered",
                BindingTarget::Container("feed".into()),
                OperationType::Highlight,
                json!({ "color": "red" }),
            ))
            .unwrap();

        let (topic, payload) = discovered("feed", &["root/1/0", "root/1/1"]);
        assert!(bus.emit(topic, payload).await.is_ok());

        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target.container_id.as_deref(), Some("feed"));
        assert_eq!(calls[0].target.dom_paths.len(), 2);
        assert_eq!(calls[0].config["color"], "red");
    }

    #[tokio::test]
    async fn last_discovered_sees_tracker_update_from_same_emit() {
        let (bus, recorder, registry) = setup();
        registry
            .register(BindingRule::new(
                "follow",
                "container:*:discovered",
                BindingTarget::LastDiscovered,
                OperationType::Scroll,
                Value::Null,
            ))
            .unwrap();

        let (topic, payload) = discovered("a", &["root/0"]);
        bus.emit(topic, payload).await;
        let (topic, payload) = discovered("b", &["root/1"]);
        bus.emit(topic, payload).await;

        let targets: Vec<_> = recorder
            .calls()
            .into_iter()
            .map(|c| c.target.container_id.unwrap())
            .collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert_eq!(registry.discovery().last_discovered().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn resolver_target_reads_payload() {
        let (bus, recorder, registry) = setup();
        let resolver: TargetResolver = Arc::new(|event: &Event| {
            event
                .payload
                .get("css")
                .and_then(Value::as_str)
                .map(OperationTarget::selector)
        });
        registry
            .register(BindingRule::new(
                "click-it",
                "page:ready",
                BindingTarget::Resolver(resolver),
                OperationType::Click,
                Value::Null,
            ))
            .unwrap();

        bus.emit("page:ready", json!({ "css": "#go" })).await;
        let report = bus.emit("page:ready", json!({})).await;

        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target.selector.as_deref(), Some("#go"));
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn re_registering_replaces_previous_rule() {
        let (bus, recorder, registry) = setup();
        for op in [OperationType::Highlight, OperationType::Click] {
            registry
                .register(BindingRule::new(
                    "same",
                    "container:x:discovered",
                    BindingTarget::Container("x".into()),
                    op,
                    Value::Null,
                ))
                .unwrap();
        }
        assert_eq!(registry.len(), 1);

        let (topic, payload) = discovered("x", &["root/0"]);
        bus.emit(topic, payload).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation_type, OperationType::Click);
    }

    #[tokio::test]
    async fn unregister_stops_firing_and_unknown_is_noop() {
        let (bus, recorder, registry) = setup();
        registry
            .register(BindingRule::new(
                "gone",
                "container:x:discovered",
                BindingTarget::Container("x".into()),
                OperationType::Highlight,
                Value::Null,
            ))
            .unwrap();
        assert!(registry.unregister("gone"));
        assert!(!registry.unregister("gone"));
        assert!(!registry.unregister("never-existed"));

        let (topic, payload) = discovered("x", &["root/0"]);
        bus.emit(topic, payload).await;
        assert!(recorder.calls().is_empty());
        assert!(registry.rules().is_empty());
    }

    #[test]
    fn invalid_trigger_is_validation_error() {
        let (_bus, _recorder, registry) = setup();
        let err = registry
            .register(BindingRule::new(
                "bad",
                "container::discovered",
                BindingTarget::LastDiscovered,
                OperationType::Highlight,
                Value::Null,
            ))
            .unwrap_err();
        assert!(matches!(err, RuleError::Validation { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn library_operations_become_bindings() {
        let (_bus, _recorder, registry) = setup();
        let library = ContainerLibrary::from_json(
            &json!({
                "lib": {
                    "containers": {
                        "feed": {
                            "selector": ".feed",
                            "operations": [
                                { "id": "hl", "triggerEvents": ["discovered", "page:refresh"], "operationType": "highlight" },
                                { "id": "grab", "operationType": "extract", "config": { "fields": ["text"] } }
                            ]
                        }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(registry.register_library_operations(&library).unwrap(), 3);
        let rules = registry.rules();
        let summary: Vec<_> = rules
            .iter()
            .map(|r| (r.id.as_str(), r.trigger.as_str()))
            .collect();
        assert_eq!(summary, vec![
            ("feed#hl@discovered", "container:feed:discovered"),
            ("feed#hl@page:refresh", "page:refresh"),
            ("feed#grab@discovered", "container:feed:discovered"),
        ]);
    }

    #[test]
    fn library_with_unknown_operation_registers_nothing() {
        let (_bus, _recorder, registry) = setup();
        let library = ContainerLibrary::from_json(
            &json!({
                "lib": { "containers": { "a": {
                    "selector": "a",
                    "operations": [
                        { "id": "ok", "operationType": "click" },
                        { "id": "bad", "operationType": "teleport" }
                    ]
                } } }
            })
            .to_string(),
        )
        .unwrap();
        assert!(registry.register_library_operations(&library).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn drop_unsubscribes() {
        let (bus, _recorder, registry) = setup();
        registry
            .register(BindingRule::new(
                "a",
                "x:y",
                BindingTarget::LastDiscovered,
                OperationType::Click,
                Value::Null,
            ))
            .unwrap();
        assert_eq!(bus.subscription_count(), 2);
        drop(registry);
        assert_eq!(bus.subscription_count(), 0);
    }
}
