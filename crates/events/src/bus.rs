//! The event bus: ordered dispatch, per-handler isolation, bounded history.

use std::{
    collections::VecDeque,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    futures::FutureExt,
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::{
    error::{EventError, Result},
    event::{ERROR_TOPIC, Event},
    handler::EventHandler,
    pattern::TopicPattern,
};

/// Default number of events retained for diagnostics.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Opaque handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ── HandlerStats ────────────────────────────────────────────────────────────

/// Per-subscription call statistics.
#[derive(Debug, Default)]
pub struct HandlerStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HandlerStats {
    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }
}

// ── Emit report ─────────────────────────────────────────────────────────────

/// A handler that returned an error (or panicked) during an emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerFailure {
    pub subscription: u64,
    pub handler: String,
    pub message: String,
}

/// Outcome of a single [`EventBus::emit`] call.
#[derive(Debug, Clone, Serialize)]
pub struct EmitReport {
    pub topic: String,
    /// Number of subscribed handlers invoked (successful or not).
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl EmitReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn the first recorded failure into an error, for callers that want
    /// handler failures to propagate.
    pub fn into_result(self) -> Result<usize> {
        match self.failures.into_iter().next() {
            None => Ok(self.delivered),
            Some(f) => Err(EventError::Handler {
                topic: self.topic,
                handler: f.handler,
                message: f.message,
            }),
        }
    }
}

// ── Subscriptions ───────────────────────────────────────────────────────────

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: Arc<dyn EventHandler>,
    stats: Arc<HandlerStats>,
    active: AtomicBool,
}

impl Subscription {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Topic-pattern pub/sub bus.
///
/// One instance is created per runtime context and shared by `Arc` with the
/// matcher, binding registry and workflow engine.
pub struct EventBus {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    observers: RwLock<Vec<Arc<dyn EventHandler>>>,
    history: Mutex<VecDeque<Event>>,
    history_limit: usize,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// A `limit` of zero disables history retention.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
            history_limit: limit,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Subscribe `handler` to every topic matching `pattern`.
    pub fn on(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Result<SubscriptionId> {
        let sub = self.build_subscription(pattern, handler)?;
        let id = sub.id;
        debug!(pattern, handler = sub.handler.name(), %id, "event handler subscribed");
        self.write_subscriptions().push(sub);
        Ok(id)
    }

    /// Remove a subscription. Unknown ids are ignored; returns whether one was removed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.write_subscriptions();
        match subs.iter().position(|s| s.id == id) {
            Some(pos) => {
                let sub = subs.remove(pos);
                sub.deactivate();
                debug!(%id, handler = sub.handler.name(), "event handler unsubscribed");
                true
            },
            None => false,
        }
    }

    /// Swap the subscription `old` for a new one in a single step.
    ///
    /// The old handler is deactivated and the new one takes its place in the
    /// dispatch order under the same write lock, so no emit can observe both.
    /// An unknown `old` appends the new subscription.
    pub fn replace(
        &self,
        old: SubscriptionId,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId> {
        let sub = self.build_subscription(pattern, handler)?;
        let id = sub.id;
        let mut subs = self.write_subscriptions();
        match subs.iter().position(|s| s.id == old) {
            Some(pos) => std::mem::replace(&mut subs[pos], sub).deactivate(),
            None => subs.push(sub),
        }
        debug!(%old, new = %id, pattern, "event handler replaced");
        Ok(id)
    }

    /// Register a diagnostic observer that sees every event, including `error`
    /// events. Observer failures are logged and otherwise ignored.
    pub fn on_any(&self, handler: Arc<dyn EventHandler>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn subscription_count(&self) -> usize {
        self.read_subscriptions().len()
    }

    pub fn handler_stats(&self, id: SubscriptionId) -> Option<Arc<HandlerStats>> {
        self.read_subscriptions()
            .iter()
            .find(|s| s.id == id)
            .map(|s| Arc::clone(&s.stats))
    }

    /// Publish an event and run every matching handler to completion.
    ///
    /// Handlers run one at a time in registration order. A handler error or
    /// panic is recorded as an `error` event and in the returned report; it
    /// does not stop the remaining handlers.
    pub async fn emit(&self, topic: impl Into<String>, payload: Value) -> EmitReport {
        let event = Event::new(topic, payload);
        self.record(&event);
        self.notify_observers(&event).await;

        let matching = self.matching(&event.topic);
        debug!(topic = %event.topic, count = matching.len(), "dispatching event");

        let mut report = EmitReport {
            topic: event.topic.clone(),
            delivered: 0,
            failures: Vec::new(),
        };

        for sub in matching {
            // Unsubscribed after the snapshot was taken.
            if !sub.is_active() {
                continue;
            }
            report.delivered += 1;
            if let Err(message) = invoke(&sub, &event).await {
                warn!(
                    topic = %event.topic,
                    handler = sub.handler.name(),
                    error = %message,
                    "event handler failed"
                );
                report.failures.push(HandlerFailure {
                    subscription: sub.id.0,
                    handler: sub.handler.name().to_string(),
                    message: message.clone(),
                });
                if !event.is_error() {
                    self.publish_error(&event, sub.handler.name(), &message)
                        .await;
                }
            }
        }

        report
    }

    /// Snapshot of retained events, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.lock_history().iter().cloned().collect()
    }

    /// Retained events whose topic matches `pattern`.
    pub fn history_matching(&self, pattern: &TopicPattern) -> Vec<Event> {
        self.lock_history()
            .iter()
            .filter(|e| pattern.matches(&e.topic))
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn build_subscription(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<Subscription>> {
        let pattern = TopicPattern::parse(pattern)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(Subscription {
            id,
            pattern,
            handler,
            stats: Arc::new(HandlerStats::default()),
            active: AtomicBool::new(true),
        }))
    }

    fn matching(&self, topic: &str) -> Vec<Arc<Subscription>> {
        self.read_subscriptions()
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .cloned()
            .collect()
    }

    /// Record and deliver an `error` event. Failures of `error` subscribers are
    /// only logged so a broken error handler cannot loop.
    async fn publish_error(&self, source: &Event, handler: &str, message: &str) {
        let event = Event::new(
            ERROR_TOPIC,
            json!({
                "topic": source.topic,
                "handler": handler,
                "message": message,
            }),
        );
        self.record(&event);
        self.notify_observers(&event).await;

        for sub in self.matching(ERROR_TOPIC) {
            if !sub.is_active() {
                continue;
            }
            if let Err(e) = invoke(&sub, &event).await {
                warn!(handler = sub.handler.name(), error = %e, "error handler failed");
            }
        }
    }

    async fn notify_observers(&self, event: &Event) {
        let observers: Vec<_> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            let result = AssertUnwindSafe(observer.handle(event))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    warn!(observer = observer.name(), error = %e, "event observer failed")
                },
                Err(_) => warn!(observer = observer.name(), "event observer panicked"),
            }
        }
    }

    fn record(&self, event: &Event) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.lock_history();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_subscriptions(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_subscriptions(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Run one handler, converting errors and panics into a message.
async fn invoke(sub: &Subscription, event: &Event) -> std::result::Result<(), String> {
    let start = Instant::now();
    let result = AssertUnwindSafe(sub.handler.handle(event))
        .catch_unwind()
        .await;
    let latency = start.elapsed();
    match result {
        Ok(Ok(())) => {
            sub.stats.record_success(latency);
            Ok(())
        },
        Ok(Err(e)) => {
            sub.stats.record_failure(latency);
            Err(format!("{e:#}"))
        },
        Err(panic) => {
            sub.stats.record_failure(latency);
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(format!("handler panicked: {detail}"))
        },
    }
}
