//! Applies substitutions to matched spans: in flat node text, inside an
//! anchored object's payload, or on a node's name/tags.
//!
//! Replacement text is the literal string, or, when the pattern is a true
//! regex, the matched span rewritten with `$1`-style back-reference
//! expansion. Read-only nodes refuse every mutation; callers still count
//! the match as found.

use crate::anchored::replace_one_in_text;
use crate::offsets;
use crate::pattern::CompiledPattern;
use crate::tree::{NodeId, NodeTree};

/// Replace the plain-text span `[start_cp, end_cp)` of the node's buffer.
/// Returns the codepoint offset just past the inserted text, or None when
/// the node is read-only and nothing was changed.
pub fn replace_in_content(
    tree: &mut NodeTree,
    node: NodeId,
    start_cp: usize,
    end_cp: usize,
    pattern: &CompiledPattern,
    replacement: &str,
) -> Option<usize> {
    if tree.read_only(node) {
        return None;
    }
    let buffer = tree.content(node).ok()?;
    let start_byte = offsets::codepoint_to_byte(&buffer, start_cp);
    let end_byte = offsets::codepoint_to_byte(&buffer, end_cp);
    let origin = &buffer[start_byte..end_byte];
    let expanded = pattern.expand(origin, replacement);
    let new_end = start_cp + expanded.chars().count();
    tree.splice_content(node, start_cp, end_cp, &expanded);
    Some(new_end)
}

/// One substitution inside the anchored object at placeholder `offset`,
/// first occurrence in the given direction. No resume-after chaining: a
/// second pass over the same object starts from scratch.
pub fn replace_in_object(
    tree: &mut NodeTree,
    node: NodeId,
    offset: usize,
    pattern: &CompiledPattern,
    replacement: &str,
    forward: bool,
) -> bool {
    if tree.read_only(node) {
        return false;
    }
    let replaced = match tree.anchored_object_mut(node, offset) {
        Some(object) => object.replace_first(pattern, replacement, forward),
        None => false,
    };
    if replaced {
        tree.mark_pending_write(node);
    }
    replaced
}

/// Substitute on whichever of name/tags the pattern matched (name wins when
/// both do, mirroring the order the match was reported in).
pub fn replace_in_name_or_tags(
    tree: &mut NodeTree,
    node: NodeId,
    pattern: &CompiledPattern,
    replacement: &str,
) -> bool {
    if tree.read_only(node) {
        return false;
    }
    let mut name = tree.name(node);
    if replace_one_in_text(&mut name, pattern, replacement, true) {
        tree.set_name(node, &name);
        return true;
    }
    let mut tags = tree.tags(node);
    if replace_one_in_text(&mut tags, pattern, replacement, true) {
        tree.set_tags(node, &tags);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchored::AnchoredObject;
    use crate::pattern::SearchOptions;
    use crate::tree::Node;

    fn pattern(raw: &str, is_regex: bool) -> CompiledPattern {
        let mut options = SearchOptions::new(raw);
        options.match_case = true;
        options.is_regex = is_regex;
        CompiledPattern::compile(&options).unwrap()
    }

    fn one_node_tree(text: &str) -> NodeTree {
        let mut tree = NodeTree::new();
        let mut node = Node::new(1, "node");
        node.append_text(text);
        tree.insert(None, node).unwrap();
        tree
    }

    #[test]
    fn test_literal_replace_in_content() {
        let mut tree = one_node_tree("say hello twice");
        let new_end = replace_in_content(&mut tree, 1, 4, 9, &pattern("hello", false), "goodbye");
        assert_eq!(new_end, Some(11));
        assert_eq!(tree.content(1).unwrap(), "say goodbye twice");
        assert!(tree.pending_write(1));
    }

    #[test]
    fn test_regex_replace_expands_back_references() {
        let mut tree = one_node_tree("version 1.42 shipped");
        let p = pattern(r"version (\d+)\.(\d+)", true);
        let new_end = replace_in_content(&mut tree, 1, 0, 12, &p, "v$1-$2");
        assert_eq!(tree.content(1).unwrap(), "v1-42 shipped");
        assert_eq!(new_end, Some(5));
    }

    #[test]
    fn test_read_only_refuses_mutation() {
        let mut tree = one_node_tree("hello");
        tree.get_mut(1).unwrap().read_only = true;
        assert_eq!(
            replace_in_content(&mut tree, 1, 0, 5, &pattern("hello", false), "bye"),
            None
        );
        assert_eq!(tree.content(1).unwrap(), "hello");
        assert!(!replace_in_object(&mut tree, 1, 0, &pattern("x", false), "y", true));
        assert!(!replace_in_name_or_tags(&mut tree, 1, &pattern("node", false), "n"));
    }

    #[test]
    fn test_replace_in_object_marks_pending() {
        let mut tree = NodeTree::new();
        let mut node = Node::new(1, "n");
        node.append_object(AnchoredObject::CodeBox {
            text: "foo".to_string(),
            language: String::new(),
        });
        tree.insert(None, node).unwrap();
        assert!(replace_in_object(&mut tree, 1, 0, &pattern("foo", false), "bar", true));
        assert!(tree.pending_write(1));
        assert_eq!(
            tree.get(1).unwrap().anchored[0].object,
            AnchoredObject::CodeBox {
                text: "bar".to_string(),
                language: String::new()
            }
        );
    }

    #[test]
    fn test_replace_on_name_then_tags() {
        let mut tree = one_node_tree("");
        tree.set_tags(1, "old tag");
        assert!(replace_in_name_or_tags(&mut tree, 1, &pattern("node", false), "leaf"));
        assert_eq!(tree.name(1), "leaf");
        // name no longer matches, so the tags get the substitution
        assert!(replace_in_name_or_tags(&mut tree, 1, &pattern("old", false), "new"));
        assert_eq!(tree.tags(1), "new tag");
    }

    #[test]
    fn test_shared_replica_replace_lands_on_master() {
        let mut tree = one_node_tree("shared body");
        let mut replica = Node::new(2, "");
        replica.shared_master_id = 1;
        tree.insert(None, replica).unwrap();
        replace_in_content(&mut tree, 2, 0, 6, &pattern("shared", false), "common");
        assert_eq!(tree.content(1).unwrap(), "common body");
        assert_eq!(tree.content(2).unwrap(), "common body");
    }
}
