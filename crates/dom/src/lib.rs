//! Address-only DOM model and the query boundary to a live page.
//!
//! Nodes are identified by [`DomPath`] (`root/1/2/0`): the chain of element
//! child indices from the document element. Paths are only stable within one
//! snapshot of a page and are the sole identifier passed between components.
//!
//! The live page sits behind [`DomQuery`]. [`memory::MemoryDom`] implements it
//! over an in-memory element tree; the browser crate implements it over CDP.

pub mod error;
pub mod fetch;
pub mod memory;
pub mod node;
pub mod path;
pub mod query;
pub mod selector;

pub use {
    error::{DomError, Result},
    fetch::{BranchFetcher, FetchLimits},
    node::{DomNode, NodeInfo, QueryOutcome},
    path::DomPath,
    query::{DomQuery, DomSessions},
};
