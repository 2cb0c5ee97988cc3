use thiserror::Error;

/// Errors surfaced by a search or replace operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    /// The pattern did not compile (bad regex syntax).
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A node's content could not be retrieved mid-traversal.
    #[error("failed to retrieve the content of the node '{0}'")]
    ContentLoad(String),

    /// `continue_search` was called before any search ran in this session.
    #[error("no previous search was performed during this session")]
    NoPreviousSearch,
}

/// Errors from structural edits on the node tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node id {0} is already present in the tree")]
    DuplicateId(i64),

    #[error("node id {0} is not a valid id (the minimum valid id is 1)")]
    InvalidId(i64),

    #[error("parent node {0} does not exist")]
    UnknownParent(i64),
}
