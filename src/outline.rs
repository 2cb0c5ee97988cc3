//! Loads a plain-text outline into a node tree for the command-line demo.
//!
//! One node per line; leading tabs set the depth, `Name: text` splits the
//! display name from the node content. This is input for the CLI only, not a
//! storage format.

use crate::error::TreeError;
use crate::pattern::now_secs;
use crate::tree::{Node, NodeId, NodeTree};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("cannot read outline: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub fn load_outline(path: &Path) -> Result<NodeTree, OutlineError> {
    let text = fs::read_to_string(path)?;
    parse_outline(&text)
}

pub fn parse_outline(text: &str) -> Result<NodeTree, OutlineError> {
    let mut tree = NodeTree::new();
    let mut ancestors: Vec<NodeId> = Vec::new();
    let mut next_id: NodeId = 1;
    let now = now_secs();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let depth = line.chars().take_while(|&c| c == '\t').count();
        let rest = &line[depth..];
        let (name, content) = match rest.split_once(':') {
            Some((name, content)) => (name.trim(), content.trim()),
            None => (rest.trim(), ""),
        };
        let depth = depth.min(ancestors.len());
        ancestors.truncate(depth);

        let mut node = Node::new(next_id, name);
        node.append_text(content);
        node.created = now;
        node.modified = now;
        tree.insert(ancestors.last().copied(), node)?;
        ancestors.push(next_id);
        next_id += 1;
    }
    Ok(tree)
}
