//! Hierarchical node store with identity resolution.
//!
//! Nodes live in an arena indexed by id. A node with a shared-master id
//! delegates its content and properties to the master node; the indirection
//! is a single hop (masters are never themselves aliases). A dangling master
//! reference is repaired on resolution: logged, cleared, and the node becomes
//! self-owned again.

use crate::anchored::AnchoredObject;
use crate::error::{SearchError, TreeError};
use crate::offsets::PLACEHOLDER_CHAR;
use crate::pattern::now_secs;
use std::collections::HashMap;

pub type NodeId = i64;

/// An anchored object together with the codepoint offset of its placeholder
/// in the owning node's buffer.
#[derive(Debug, Clone)]
pub struct AnchoredSlot {
    pub offset: usize,
    pub object: AnchoredObject,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub tags: String,
    pub syntax: String,
    /// Unicode codepoints; anchored-object positions hold U+FFFC.
    pub buffer: String,
    /// Kept sorted by offset.
    pub anchored: Vec<AnchoredSlot>,
    pub created: i64,
    pub modified: i64,
    pub read_only: bool,
    pub exclude_from_search: bool,
    pub exclude_children_from_search: bool,
    /// 0 = self-owned, > 0 = all content/property access goes to that node.
    pub shared_master_id: NodeId,
    pub pending_write: bool,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Position among siblings at insertion time.
    pub sequence: usize,
}

impl Node {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            tags: String::new(),
            syntax: String::new(),
            buffer: String::new(),
            anchored: Vec::new(),
            created: 0,
            modified: 0,
            read_only: false,
            exclude_from_search: false,
            exclude_children_from_search: false,
            shared_master_id: 0,
            pending_write: false,
            children: Vec::new(),
            parent: None,
            sequence: 0,
        }
    }

    pub fn append_text(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Append an anchored object, which occupies one placeholder codepoint
    /// at the current end of the buffer.
    pub fn append_object(&mut self, object: AnchoredObject) {
        let offset = self.buffer.chars().count();
        self.buffer.push(PLACEHOLDER_CHAR);
        self.anchored.push(AnchoredSlot { offset, object });
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: HashMap<NodeId, Node>,
    top_level: Vec<NodeId>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: Option<NodeId>, mut node: Node) -> Result<(), TreeError> {
        if node.id < 1 {
            return Err(TreeError::InvalidId(node.id));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateId(node.id));
        }
        node.parent = parent;
        match parent {
            Some(parent_id) => {
                let parent_node = self
                    .nodes
                    .get_mut(&parent_id)
                    .ok_or(TreeError::UnknownParent(parent_id))?;
                node.sequence = parent_node.children.len();
                parent_node.children.push(node.id);
            }
            None => {
                node.sequence = self.top_level.len();
                self.top_level.push(node.id);
            }
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// The id whose node actually owns content and properties for `id`:
    /// the shared master if one is set and present, otherwise `id` itself.
    /// Does not repair dangling references; see [`NodeTree::resolve`].
    pub fn owner_of(&self, id: NodeId) -> NodeId {
        match self.nodes.get(&id) {
            Some(node) if node.shared_master_id > 0 => {
                if self.nodes.contains_key(&node.shared_master_id) {
                    node.shared_master_id
                } else {
                    id
                }
            }
            _ => id,
        }
    }

    /// Resolve `id` to its content owner, repairing a dangling master
    /// reference by clearing it so the node becomes self-owned.
    pub fn resolve(&mut self, id: NodeId) -> NodeId {
        let master_id = match self.nodes.get(&id) {
            Some(node) if node.shared_master_id > 0 => node.shared_master_id,
            _ => return id,
        };
        if self.nodes.contains_key(&master_id) {
            master_id
        } else {
            log::error!("shared node {id} references missing master {master_id}, reverting to self-owned");
            if let Some(node) = self.nodes.get_mut(&id) {
                node.shared_master_id = 0;
            }
            id
        }
    }

    fn owner(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&self.owner_of(id))
    }

    pub fn name(&self, id: NodeId) -> String {
        self.owner(id).map(|n| n.name.clone()).unwrap_or_default()
    }

    pub fn tags(&self, id: NodeId) -> String {
        self.owner(id).map(|n| n.tags.clone()).unwrap_or_default()
    }

    pub fn syntax(&self, id: NodeId) -> String {
        self.owner(id).map(|n| n.syntax.clone()).unwrap_or_default()
    }

    pub fn read_only(&self, id: NodeId) -> bool {
        self.owner(id).map(|n| n.read_only).unwrap_or(false)
    }

    pub fn created(&self, id: NodeId) -> i64 {
        self.owner(id).map(|n| n.created).unwrap_or(0)
    }

    pub fn modified(&self, id: NodeId) -> i64 {
        self.owner(id).map(|n| n.modified).unwrap_or(0)
    }

    pub fn excluded_from_search(&self, id: NodeId) -> bool {
        self.owner(id).map(|n| n.exclude_from_search).unwrap_or(false)
    }

    pub fn children_excluded_from_search(&self, id: NodeId) -> bool {
        self.owner(id)
            .map(|n| n.exclude_children_from_search)
            .unwrap_or(false)
    }

    pub fn pending_write(&self, id: NodeId) -> bool {
        self.owner(id).map(|n| n.pending_write).unwrap_or(false)
    }

    /// Snapshot of the node's content buffer, placeholders included.
    pub fn content(&self, id: NodeId) -> Result<String, SearchError> {
        self.owner(id)
            .map(|n| n.buffer.clone())
            .ok_or_else(|| SearchError::ContentLoad(format!("id {id}")))
    }

    /// Display name with tags appended when the node carries any.
    pub fn name_with_tags(&self, id: NodeId) -> String {
        let name = self.name(id);
        let tags = self.tags(id);
        if tags.is_empty() {
            name
        } else {
            format!("{name}\n [Tags: {tags}]")
        }
    }

    /// Ancestor names joined root-to-leaf.
    pub fn hierarchical_name(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(curr_id) = current {
            names.push(self.name(curr_id));
            current = self.nodes.get(&curr_id).and_then(|n| n.parent);
        }
        names.reverse();
        names.join("  /  ")
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) {
        let owner_id = self.owner_of(id);
        if let Some(node) = self.nodes.get_mut(&owner_id) {
            node.name = name.to_string();
            node.pending_write = true;
        }
    }

    pub fn set_tags(&mut self, id: NodeId, tags: &str) {
        let owner_id = self.owner_of(id);
        if let Some(node) = self.nodes.get_mut(&owner_id) {
            node.tags = tags.to_string();
            node.pending_write = true;
        }
    }

    pub fn mark_pending_write(&mut self, id: NodeId) {
        let owner_id = self.owner_of(id);
        if let Some(node) = self.nodes.get_mut(&owner_id) {
            node.pending_write = true;
        }
    }

    /// Anchored objects whose placeholder lies in `[lo, hi]` (inclusive),
    /// in ascending offset order.
    pub fn anchored_in_range(&self, id: NodeId, lo: usize, hi: usize) -> Vec<AnchoredSlot> {
        let Some(node) = self.owner(id) else {
            return Vec::new();
        };
        let mut slots: Vec<AnchoredSlot> = node
            .anchored
            .iter()
            .filter(|slot| slot.offset >= lo && slot.offset <= hi)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.offset);
        slots
    }

    pub fn anchored_object_mut(
        &mut self,
        id: NodeId,
        offset: usize,
    ) -> Option<&mut AnchoredObject> {
        let owner_id = self.owner_of(id);
        self.nodes
            .get_mut(&owner_id)?
            .anchored
            .iter_mut()
            .find(|slot| slot.offset == offset)
            .map(|slot| &mut slot.object)
    }

    /// Replace the codepoint span `[start_cp, end_cp)` of the node's buffer
    /// with plain text. Anchored objects inside the erased span are dropped;
    /// objects past it shift by the length difference. Bumps the modified
    /// timestamp and the pending-write marker.
    pub fn splice_content(&mut self, id: NodeId, start_cp: usize, end_cp: usize, text: &str) {
        let owner_id = self.owner_of(id);
        let Some(node) = self.nodes.get_mut(&owner_id) else {
            return;
        };
        let start_byte = byte_at(&node.buffer, start_cp);
        let end_byte = byte_at(&node.buffer, end_cp);
        node.buffer.replace_range(start_byte..end_byte, text);

        let removed = end_cp - start_cp;
        let inserted = text.chars().count();
        node.anchored.retain(|slot| slot.offset < start_cp || slot.offset >= end_cp);
        for slot in &mut node.anchored {
            if slot.offset >= end_cp {
                slot.offset = slot.offset - removed + inserted;
            }
        }
        node.modified = now_secs();
        node.pending_write = true;
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn top_level(&self) -> &[NodeId] {
        &self.top_level
    }

    /// Next (forward) or previous (backward) sibling of `id`.
    pub fn sibling(&self, id: NodeId, forward: bool) -> Option<NodeId> {
        let siblings = match self.parent_of(id) {
            Some(parent_id) => self.children_of(parent_id),
            None => self.top_level(),
        };
        let pos = siblings.iter().position(|&s| s == id)?;
        if forward {
            siblings.get(pos + 1).copied()
        } else {
            pos.checked_sub(1).and_then(|p| siblings.get(p)).copied()
        }
    }

    /// First (forward) or last (backward) child of `id`.
    pub fn first_child(&self, id: NodeId, forward: bool) -> Option<NodeId> {
        let children = self.children_of(id);
        if forward {
            children.first().copied()
        } else {
            children.last().copied()
        }
    }

    pub fn lookup_by_id(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Tree-wide preorder search for the first node with this display name.
    pub fn lookup_by_name(&self, name: &str) -> Option<NodeId> {
        fn walk(tree: &NodeTree, ids: &[NodeId], name: &str) -> Option<NodeId> {
            for &id in ids {
                if tree.name(id) == name {
                    return Some(id);
                }
                if let Some(found) = walk(tree, tree.children_of(id), name) {
                    return Some(found);
                }
            }
            None
        }
        walk(self, &self.top_level, name)
    }

    pub fn count_all(&self) -> usize {
        self.top_level
            .iter()
            .map(|&id| self.count_subtree(id))
            .sum()
    }

    /// The node plus all of its descendants.
    pub fn count_subtree(&self, id: NodeId) -> usize {
        1 + self
            .children_of(id)
            .iter()
            .map(|&child| self.count_subtree(child))
            .sum::<usize>()
    }
}

fn byte_at(text: &str, cp: usize) -> usize {
    crate::offsets::codepoint_to_byte(text, cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> NodeTree {
        let mut tree = NodeTree::new();
        tree.insert(None, Node::new(1, "root")).unwrap();
        tree.insert(Some(1), Node::new(2, "alpha")).unwrap();
        tree.insert(Some(1), Node::new(3, "beta")).unwrap();
        tree.insert(Some(3), Node::new(4, "gamma")).unwrap();
        tree
    }

    #[test]
    fn test_insert_and_navigation() {
        let tree = sample_tree();
        assert_eq!(tree.top_level(), &[1]);
        assert_eq!(tree.children_of(1), &[2, 3]);
        assert_eq!(tree.parent_of(4), Some(3));
        assert_eq!(tree.sibling(2, true), Some(3));
        assert_eq!(tree.sibling(2, false), None);
        assert_eq!(tree.get(3).unwrap().sequence, 1);
        assert_eq!(tree.count_all(), 4);
        assert_eq!(tree.count_subtree(3), 2);
    }

    #[test]
    fn test_insert_rejects_bad_ids() {
        let mut tree = sample_tree();
        assert_eq!(
            tree.insert(None, Node::new(0, "zero")),
            Err(TreeError::InvalidId(0))
        );
        assert_eq!(
            tree.insert(None, Node::new(2, "dup")),
            Err(TreeError::DuplicateId(2))
        );
        assert_eq!(
            tree.insert(Some(99), Node::new(9, "orphan")),
            Err(TreeError::UnknownParent(99))
        );
    }

    #[test]
    fn test_lookup_by_name_preorder() {
        let tree = sample_tree();
        assert_eq!(tree.lookup_by_name("gamma"), Some(4));
        assert_eq!(tree.lookup_by_name("missing"), None);
    }

    #[test]
    fn test_shared_alias_delegates_reads() {
        let mut tree = sample_tree();
        if let Some(master) = tree.get_mut(2) {
            master.append_text("master content");
            master.tags = "work".to_string();
        }
        let mut replica = Node::new(5, "");
        replica.shared_master_id = 2;
        tree.insert(Some(1), replica).unwrap();

        assert_eq!(tree.name(5), "alpha");
        assert_eq!(tree.tags(5), "work");
        assert_eq!(tree.content(5).unwrap(), "master content");
    }

    #[test]
    fn test_shared_alias_edit_is_visible_everywhere() {
        let mut tree = sample_tree();
        let mut replica = Node::new(5, "");
        replica.shared_master_id = 2;
        tree.insert(Some(1), replica).unwrap();

        tree.set_name(5, "renamed");
        assert_eq!(tree.name(2), "renamed");
        assert_eq!(tree.name(5), "renamed");
        assert_eq!(tree.resolve(5), 2);
        assert_eq!(tree.resolve(2), 2);
        assert!(tree.pending_write(2));
    }

    #[test]
    fn test_broken_alias_is_repaired_once() {
        let mut tree = sample_tree();
        let mut replica = Node::new(5, "stray");
        replica.shared_master_id = 77;
        replica.append_text("own text");
        tree.insert(Some(1), replica).unwrap();

        assert_eq!(tree.resolve(5), 5);
        assert_eq!(tree.get(5).unwrap().shared_master_id, 0);
        assert_eq!(tree.content(5).unwrap(), "own text");
    }

    #[test]
    fn test_hierarchical_name() {
        let tree = sample_tree();
        assert_eq!(tree.hierarchical_name(4), "root  /  beta  /  gamma");
    }

    #[test]
    fn test_name_with_tags() {
        let mut tree = sample_tree();
        assert_eq!(tree.name_with_tags(2), "alpha");
        tree.set_tags(2, "todo urgent");
        assert_eq!(tree.name_with_tags(2), "alpha\n [Tags: todo urgent]");
    }

    #[test]
    fn test_anchored_in_range_is_inclusive() {
        let mut tree = NodeTree::new();
        let mut node = Node::new(1, "n");
        node.append_text("ab");
        node.append_object(AnchoredObject::ImagePng); // offset 2
        node.append_text("cd");
        node.append_object(AnchoredObject::ImagePng); // offset 5
        tree.insert(None, node).unwrap();

        assert_eq!(tree.anchored_in_range(1, 0, 1).len(), 0);
        assert_eq!(tree.anchored_in_range(1, 0, 2).len(), 1);
        assert_eq!(tree.anchored_in_range(1, 2, 5).len(), 2);
        assert_eq!(tree.anchored_in_range(1, 3, 4).len(), 0);
    }

    #[test]
    fn test_splice_content_shifts_and_drops_anchors() {
        let mut tree = NodeTree::new();
        let mut node = Node::new(1, "n");
        node.append_text("hello ");
        node.append_object(AnchoredObject::ImagePng); // offset 6
        node.append_text(" world");
        tree.insert(None, node).unwrap();

        // replace "hello" (0..5) with "hi": anchor shifts left by 3
        tree.splice_content(1, 0, 5, "hi");
        assert_eq!(tree.get(1).unwrap().anchored[0].offset, 3);
        assert!(tree.content(1).unwrap().starts_with("hi "));
        assert!(tree.pending_write(1));

        // erase a span covering the placeholder: the object is dropped
        tree.splice_content(1, 2, 5, "-");
        assert!(tree.get(1).unwrap().anchored.is_empty());
        assert_eq!(tree.content(1).unwrap(), "hi-world");
    }
}
