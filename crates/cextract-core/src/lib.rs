//! cextract Core
//!
//! Core types shared by the cextract front end and closure engine: source
//! positions, the arena program graph, configuration and errors.

pub mod config;
pub mod error;
pub mod graph;
pub mod location;

pub use error::{Error, Result, UnresolvedReason};
pub use graph::*;
pub use location::{FileId, Location, SourcePos, Span};
