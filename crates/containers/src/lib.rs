//! Container libraries and their resolution against a live page.
//!
//! A [`ContainerLibrary`] describes a page as a forest of selector-addressed
//! containers. The [`ContainerMatcher`] resolves it against a
//! [`cartograph_dom::DomQuery`], assigns a `dom_path` to every hit and
//! announces appearances on the event bus as `container:<id>:discovered`.

pub mod error;
pub mod library;
pub mod matcher;
pub mod service;

pub use {
    error::{LibraryError, MatchError},
    library::{Container, ContainerLibrary, ContainerOperation, LibraryCatalog},
    matcher::{
        ContainerMatch, ContainerMatcher, ContainerTreeNode, MatchOptions, MatchSnapshot,
        MatchedNode,
    },
    service::{
        BranchRequest, BranchResponse, ContainerService, MatchRequest, MatchResponse,
        MatchSnapshotBody,
    },
};
