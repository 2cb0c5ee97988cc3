//! Find/replace engine for hierarchical note trees.
//!
//! The tree holds nodes with text content, where single-codepoint
//! placeholders stand in for embedded structured objects (tables, code
//! boxes, anchors, embedded files, LaTeX). A search session traverses a
//! scope in either direction, matches content, names/tags and anchored
//! payloads, and can apply literal or regex replacements transactionally per
//! node.
//!
//! The entry point is [`SearchSession`]; build a [`NodeTree`], pick
//! [`SearchOptions`] and a [`SearchScope`], and start a search or replace.

pub mod anchored;
pub mod engine;
pub mod error;
pub mod offsets;
pub mod outline;
pub mod pattern;
pub mod replace;
pub mod traverse;
pub mod tree;

// Re-export main types for convenience
pub use anchored::{AnchorHit, AnchorKind, AnchoredObject};
pub use engine::{CurrentFind, MatchRecord, Outcome, SearchSession, SearchState, StopHandle};
pub use error::{SearchError, TreeError};
pub use pattern::{CompiledPattern, MatchMode, SearchDirection, SearchOptions, TimeBound};
pub use traverse::{SearchScope, TraversalCursor, Visit};
pub use tree::{AnchoredSlot, Node, NodeId, NodeTree};
