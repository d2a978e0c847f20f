//! Tree normalization and field flattening for XML-derived trees.
//!
//! Repeated sibling elements collapse into one representative node plus a
//! [`LoopSetting`] carrying the original occurrence count; that is what lets
//! the generator re-expand to an arbitrary N and presents one editable
//! template for all repetitions. JSON/CSV trees get their loops structurally
//! at build time (see the parsers), so only XML needs this pass.

use crate::model::{FieldSetting, LoopSetting, Node};
use crate::path::{normalize_id, normalize_loop_id, to_template_path};
use std::collections::HashMap;

/// Collapse repeated direct children into single representatives.
///
/// For each distinct child tag appearing more than once, only the first
/// occurrence is kept and tagged with a loop id equal to its own path;
/// one [`LoopSetting`] records the original count. Recurses into the kept
/// children.
pub fn normalize_loops(mut node: Node, path: &str, loops: &mut Vec<LoopSetting>) -> Node {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for child in &node.children {
        *counts.entry(child.tag.clone()).or_insert(0) += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Node> = Vec::new();

    for mut child in std::mem::take(&mut node.children) {
        let occurrence = seen.entry(child.tag.clone()).or_insert(0);
        *occurrence += 1;
        let total = counts[&child.tag];

        if total > 1 {
            if *occurrence == 1 {
                let loop_id = format!("{}/{}", path, child.tag);
                loops.push(LoopSetting::new(loop_id.clone(), total));
                child.loop_id = Some(loop_id);
                kept.push(child);
            }
        } else {
            kept.push(child);
        }
    }

    node.children = kept
        .into_iter()
        .map(|child| {
            let child_path = format!("{}/{}", path, child.tag);
            normalize_loops(child, &child_path, loops)
        })
        .collect();
    node
}

/// Walk the normalized tree producing one field setting per attribute and
/// per non-blank leaf. Loop representatives contribute a `[]` marker to the
/// paths of everything beneath them.
pub fn flatten_fields(node: &Node, path: &str, fields: &mut Vec<FieldSetting>) {
    let label = normalize_id(path).to_string();

    for attr in &node.attrs {
        let attr_id = format!("{}/@{}", label, attr.name);
        fields.push(FieldSetting::new(attr_id, attr.value.clone(), None));
    }

    if node.children.is_empty() {
        if let Some(text) = &node.text {
            let value = text.trim();
            if !value.is_empty() {
                fields.push(FieldSetting::new(label, value, None));
            }
        }
    }

    for child in &node.children {
        let child_path = if child.loop_id.is_some() {
            format!("{}/{}[]", path, child.tag)
        } else {
            format!("{}/{}", path, child.tag)
        };
        flatten_fields(child, &child_path, fields);
    }
}

/// Mark the node at `target_path` as a loop representative, by structural
/// copy. Used for manual loop toggling on XML trees.
pub fn apply_loop_marker(node: &Node, path: &str, target_path: &str, loop_id: &str) -> Node {
    let template_path = to_template_path(path);
    let mut next = node.clone();
    next.children = node
        .children
        .iter()
        .map(|child| {
            let child_path = child_concrete_path(path, child);
            apply_loop_marker(child, &child_path, target_path, loop_id)
        })
        .collect();
    if template_path == target_path {
        next.loop_id = Some(normalize_loop_id(loop_id));
    }
    next
}

/// Remove the loop marker from the node at `target_path`, by structural copy.
pub fn clear_loop_marker(node: &Node, path: &str, target_path: &str) -> Node {
    let template_path = to_template_path(path);
    let mut next = node.clone();
    next.children = node
        .children
        .iter()
        .map(|child| {
            let child_path = child_concrete_path(path, child);
            clear_loop_marker(child, &child_path, target_path)
        })
        .collect();
    if template_path == target_path {
        next.loop_id = None;
    }
    next
}

fn child_concrete_path(path: &str, child: &Node) -> String {
    if child.loop_id.is_some() {
        format!("{}/{}[]", path, child.tag)
    } else {
        format!("{}/{}", path, child.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    fn item(name: &str, value: &str) -> Node {
        let mut node = Node::container("item");
        node.children.push(Node::xml_leaf(name, value));
        node
    }

    #[test]
    fn test_repeated_siblings_collapse_to_first() {
        let mut root = Node::container("root");
        root.children.push(item("name", "a"));
        root.children.push(item("name", "b"));
        root.children.push(item("name", "c"));

        let mut loops = Vec::new();
        let root = normalize_loops(root, "/root", &mut loops);

        assert_eq!(root.children.len(), 1);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].id, "/root/item");
        assert_eq!(loops[0].count, 3);
        assert_eq!(root.children[0].loop_id.as_deref(), Some("/root/item"));
    }

    #[test]
    fn test_single_children_untouched() {
        let mut root = Node::container("root");
        root.children.push(Node::xml_leaf("id", "1"));
        root.children.push(Node::xml_leaf("name", "x"));

        let mut loops = Vec::new();
        let root = normalize_loops(root, "/root", &mut loops);

        assert_eq!(root.children.len(), 2);
        assert!(loops.is_empty());
        assert!(root.children[0].loop_id.is_none());
    }

    #[test]
    fn test_flatten_leaf_and_attribute_ids() {
        let mut root = Node::container("order");
        root.attrs.push(crate::model::Attr {
            name: "version".into(),
            value: "2".into(),
        });
        root.children.push(Node::xml_leaf("id", "  A100  "));
        root.children.push(Node::xml_leaf("empty", "   "));

        let mut fields = Vec::new();
        flatten_fields(&root, "/order", &mut fields);

        let ids: Vec<&str> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["order/@version", "order/id"]);
        // leaf text trimmed at flatten time
        assert_eq!(fields[1].value, "A100");
    }

    #[test]
    fn test_flatten_appends_loop_marker() {
        let mut root = Node::container("root");
        root.children.push(item("name", "a"));
        root.children.push(item("name", "b"));

        let mut loops = Vec::new();
        let root = normalize_loops(root, "/root", &mut loops);
        let mut fields = Vec::new();
        flatten_fields(&root, "/root", &mut fields);

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id, "root/item[]/name");
        assert_eq!(fields[0].kind, FieldKind::Text);
    }

    #[test]
    fn test_loop_marker_toggle_is_structural_copy() {
        let mut root = Node::container("root");
        root.children.push(item("name", "a"));

        let marked = apply_loop_marker(&root, "/root", "root/item", "/root/item");
        assert!(root.children[0].loop_id.is_none());
        assert_eq!(marked.children[0].loop_id.as_deref(), Some("/root/item"));

        let cleared = clear_loop_marker(&marked, "/root", "root/item");
        assert!(cleared.children[0].loop_id.is_none());
        // original marked tree untouched
        assert!(marked.children[0].loop_id.is_some());
    }
}
