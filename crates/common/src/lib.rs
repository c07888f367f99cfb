//! Shared error-context plumbing and small utilities used across all cartograph crates.

pub mod error;
pub mod time;

pub use {error::FromMessage, time::now_ms};
