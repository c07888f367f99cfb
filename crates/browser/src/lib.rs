//! Chromium-backed implementations of the DOM and operation boundaries.
//!
//! - [`CdpDom`] answers selector queries and node inspection with page
//!   JavaScript, addressing elements by `DomPath`.
//! - [`CdpOperations`] runs highlight, extract, scroll, click and type.
//! - [`PageSessions`] maps session ids to open pages for the container
//!   service.
//! - [`launch_page`] starts a host browser on a URL.

pub mod detect;
pub mod error;
pub mod operations;
pub mod page;
pub mod script;
pub mod sessions;

pub use {
    error::BrowserError,
    operations::CdpOperations,
    page::CdpDom,
    sessions::{LaunchedPage, PageSessions, launch_page},
};
