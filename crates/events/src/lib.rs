//! Topic-pattern publish/subscribe with bounded history.
//!
//! Topics are colon-segmented strings (`container:feed_list:discovered`).
//! Patterns use `*` to match exactly one segment. Handlers registered on the
//! same [`EventBus`] run sequentially, in registration order, and a failing
//! handler never prevents the others from running.

pub mod bus;
pub mod error;
pub mod event;
pub mod handler;
pub mod pattern;

pub use {
    bus::{EmitReport, EventBus, HandlerFailure, HandlerStats, SubscriptionId},
    error::{EventError, Result},
    event::{ERROR_TOPIC, Event},
    handler::{EventHandler, handler_fn},
    pattern::TopicPattern,
};
