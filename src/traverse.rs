//! Ordered node traversal for a search pass.
//!
//! Depth-first pre-order over the requested scope, forward (children
//! first-to-last) or backward (last-to-first). Climbing out of an exhausted
//! subtree moves to the next uncle in direction order and never re-enters an
//! ancestor. Exclusion flags are honored unless overridden; whether any
//! exclusion was actually hit is reported back as a value, not shared state.

use crate::pattern::SearchDirection;
use crate::tree::{NodeId, NodeTree};

/// The part of the tree one search operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the given node, no traversal.
    SingleNode(NodeId),
    /// The given node and its descendants.
    SelectedSubtree(NodeId),
    /// Every node; `start` resumes mid-tree instead of at the first or last
    /// top-level sibling.
    WholeTree { start: Option<NodeId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    AtNode,
    DescendingIntoChildren,
    ClimbingToUncle,
    Exhausted,
}

/// One node yielded by the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub node: NodeId,
    /// False when the node's own content and name are skipped because the
    /// node is excluded from search; its subtree is still visited.
    pub search_own: bool,
}

#[derive(Debug)]
pub struct TraversalCursor {
    forward: bool,
    override_exclusions: bool,
    scope: SearchScope,
    state: CursorState,
    current: NodeId,
    hit_exclusion: bool,
}

impl TraversalCursor {
    pub fn new(
        tree: &NodeTree,
        scope: SearchScope,
        direction: SearchDirection,
        override_exclusions: bool,
    ) -> Self {
        let forward = direction.is_forward();
        let (state, current) = match scope {
            SearchScope::SingleNode(id) | SearchScope::SelectedSubtree(id) => {
                (CursorState::AtNode, id)
            }
            SearchScope::WholeTree { start: Some(id) } => (CursorState::AtNode, id),
            SearchScope::WholeTree { start: None } => {
                let first = if forward {
                    tree.top_level().first().copied()
                } else {
                    tree.top_level().last().copied()
                };
                match first {
                    Some(id) => (CursorState::AtNode, id),
                    None => (CursorState::Exhausted, 0),
                }
            }
        };
        Self {
            forward,
            override_exclusions,
            scope,
            state,
            current,
            hit_exclusion: false,
        }
    }

    /// Whether any exclusion flag actually suppressed a node or subtree
    /// during the traversal so far.
    pub fn hit_exclusion(&self) -> bool {
        self.hit_exclusion
    }

    pub fn next(&mut self, tree: &NodeTree) -> Option<Visit> {
        loop {
            match self.state {
                CursorState::Exhausted => return None,
                CursorState::AtNode => {
                    let node = self.current;
                    self.state = if matches!(self.scope, SearchScope::SingleNode(_)) {
                        CursorState::Exhausted
                    } else {
                        CursorState::DescendingIntoChildren
                    };
                    let excluded = tree.excluded_from_search(node);
                    let search_own = !excluded || self.override_exclusions;
                    if excluded && !self.override_exclusions {
                        self.hit_exclusion = true;
                    }
                    return Some(Visit { node, search_own });
                }
                CursorState::DescendingIntoChildren => {
                    let blocked = tree.children_excluded_from_search(self.current)
                        && !self.override_exclusions;
                    if blocked {
                        if !tree.children_of(self.current).is_empty() {
                            self.hit_exclusion = true;
                        }
                        self.state = CursorState::ClimbingToUncle;
                    } else if let Some(child) = tree.first_child(self.current, self.forward) {
                        self.current = child;
                        self.state = CursorState::AtNode;
                    } else {
                        self.state = CursorState::ClimbingToUncle;
                    }
                }
                CursorState::ClimbingToUncle => {
                    if let SearchScope::SelectedSubtree(root) = self.scope {
                        if self.current == root {
                            self.state = CursorState::Exhausted;
                            continue;
                        }
                    }
                    if let Some(sibling) = tree.sibling(self.current, self.forward) {
                        self.current = sibling;
                        self.state = CursorState::AtNode;
                    } else if let Some(parent) = tree.parent_of(self.current) {
                        // only the uncles are candidates, never the parent itself
                        self.current = parent;
                    } else {
                        self.state = CursorState::Exhausted;
                    }
                }
            }
        }
    }
}
