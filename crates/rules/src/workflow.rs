//! When/then workflow rules with per-rule evaluation logs.

use std::{
    collections::{BTreeMap, VecDeque},
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    cartograph_common::now_ms,
    cartograph_events::{Event, EventBus, EventError, EventHandler, SubscriptionId},
    futures::future::{BoxFuture, FutureExt},
    serde::Serialize,
    tracing::{debug, info},
};

use crate::error::{Result, RuleError};

/// Evaluation log entries kept per rule unless configured otherwise.
pub const DEFAULT_EVALUATION_LIMIT: usize = 50;

pub type RuleAction = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct WorkflowRule {
    pub id: String,
    /// Topic pattern.
    pub when: String,
    pub then: RuleAction,
    pub enabled: bool,
}

impl WorkflowRule {
    pub fn new<F, Fut>(id: impl Into<String>, when: impl Into<String>, then: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            when: when.into(),
            then: Arc::new(move |event| then(event).boxed()),
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl std::fmt::Debug for WorkflowRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRule")
            .field("id", &self.id)
            .field("when", &self.when)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum EvaluationOutcome {
    Success,
    SkippedDisabled,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub event: Event,
    pub timestamp_ms: u64,
    pub outcome: EvaluationOutcome,
}

/// Listing entry returned by [`WorkflowEngine::rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub id: String,
    pub when: String,
    pub enabled: bool,
    pub evaluations: usize,
}

// ── Rule slot ───────────────────────────────────────────────────────────────

struct RuleSlot {
    id: String,
    when: String,
    enabled: AtomicBool,
    log: Mutex<VecDeque<Evaluation>>,
    limit: usize,
}

impl RuleSlot {
    fn push(&self, event: &Event, outcome: EvaluationOutcome) {
        if self.limit == 0 {
            return;
        }
        let mut log = self.lock_log();
        while log.len() >= self.limit {
            log.pop_front();
        }
        log.push_back(Evaluation {
            event: event.clone(),
            timestamp_ms: now_ms(),
            outcome,
        });
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, VecDeque<Evaluation>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct RuleHandler {
    name: String,
    slot: Arc<RuleSlot>,
    then: RuleAction,
}

#[async_trait]
impl EventHandler for RuleHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        if !self.slot.enabled.load(Ordering::Acquire) {
            self.slot.push(event, EvaluationOutcome::SkippedDisabled);
            return Ok(());
        }

        let result = AssertUnwindSafe((self.then)(event.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("rule handler panicked")));
        match result {
            Ok(()) => {
                self.slot.push(event, EvaluationOutcome::Success);
                Ok(())
            },
            Err(e) => {
                self.slot.push(event, EvaluationOutcome::Error {
                    message: format!("{e:#}"),
                });
                Err(e)
            },
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

struct Entry {
    slot: Arc<RuleSlot>,
    subscription: SubscriptionId,
}

/// Runs workflow rules off a shared bus.
///
/// A rule's `then` failure is recorded in its log and reported by the
/// triggering `emit` like any other handler failure.
pub struct WorkflowEngine {
    bus: Arc<EventBus>,
    evaluation_limit: usize,
    rules: Mutex<Vec<Entry>>,
}

impl WorkflowEngine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_evaluation_limit(bus, DEFAULT_EVALUATION_LIMIT)
    }

    pub fn with_evaluation_limit(bus: Arc<EventBus>, evaluation_limit: usize) -> Self {
        Self {
            bus,
            evaluation_limit,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe `rule` on its `when` pattern.
    ///
    /// Empty ids, empty or malformed patterns and duplicate ids are rejected
    /// before anything is subscribed.
    pub fn add_rule(&self, rule: WorkflowRule) -> Result<()> {
        if rule.id.trim().is_empty() {
            return Err(RuleError::validation("workflow rule id must not be empty"));
        }
        if rule.when.trim().is_empty() {
            return Err(RuleError::validation(format!(
                "workflow rule '{}' has no trigger pattern",
                rule.id
            )));
        }

        let mut rules = self.lock_rules();
        if rules.iter().any(|e| e.slot.id == rule.id) {
            return Err(RuleError::validation(format!(
                "workflow rule '{}' already exists",
                rule.id
            )));
        }

        let slot = Arc::new(RuleSlot {
            id: rule.id.clone(),
            when: rule.when.clone(),
            enabled: AtomicBool::new(rule.enabled),
            log: Mutex::new(VecDeque::new()),
            limit: self.evaluation_limit,
        });
        let handler = Arc::new(RuleHandler {
            name: format!("workflow:{}", rule.id),
            slot: Arc::clone(&slot),
            then: rule.then,
        });
        let subscription = self.bus.on(&rule.when, handler).map_err(|e| match e {
            EventError::InvalidPattern { pattern, reason } => RuleError::validation(format!(
                "workflow rule '{}': invalid pattern '{pattern}': {reason}",
                rule.id
            )),
            other => RuleError::Event(other),
        })?;

        info!(rule = %rule.id, when = %rule.when, enabled = rule.enabled, "workflow rule added");
        rules.push(Entry { slot, subscription });
        Ok(())
    }

    /// Flip a rule on or off without touching its subscription.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.lock_rules().iter().find(|e| e.slot.id == id) {
            Some(entry) => {
                entry.slot.enabled.store(enabled, Ordering::Release);
                debug!(rule = %id, enabled, "workflow rule toggled");
                true
            },
            None => false,
        }
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.lock_rules();
        let Some(pos) = rules.iter().position(|e| e.slot.id == id) else {
            return false;
        };
        let entry = rules.remove(pos);
        self.bus.off(entry.subscription);
        true
    }

    pub fn rules(&self) -> Vec<RuleSummary> {
        self.lock_rules()
            .iter()
            .map(|e| RuleSummary {
                id: e.slot.id.clone(),
                when: e.slot.when.clone(),
                enabled: e.slot.enabled.load(Ordering::Acquire),
                evaluations: e.slot.lock_log().len(),
            })
            .collect()
    }

    /// Evaluation logs by rule id, oldest first.
    pub fn get_rule_evaluations(&self) -> BTreeMap<String, Vec<Evaluation>> {
        self.lock_rules()
            .iter()
            .map(|e| (e.slot.id.clone(), e.slot.lock_log().iter().cloned().collect()))
            .collect()
    }

    pub fn evaluations(&self, id: &str) -> Option<Vec<Evaluation>> {
        self.lock_rules()
            .iter()
            .find(|e| e.slot.id == id)
            .map(|e| e.slot.lock_log().iter().cloned().collect())
    }

    /// Unsubscribe every rule and drop all evaluation logs.
    pub fn destroy(&self) {
        let entries: Vec<Entry> = self.lock_rules().drain(..).collect();
        for entry in &entries {
            self.bus.off(entry.subscription);
            entry.slot.lock_log().clear();
        }
        info!(count = entries.len(), "workflow engine destroyed");
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }
}
