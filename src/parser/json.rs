//! JSON parser: serde_json value tree into the generic node shape.
//!
//! Objects become containers keyed by property name (insertion order is
//! preserved), arrays become a container with exactly one representative
//! child built from the first element plus a synthetic loop covering the
//! position, and scalars carry both the inferred kind and the original
//! JSON type so regeneration can emit numbers/booleans/null faithfully.

use crate::error::{ParseError, ParseResult};
use crate::model::{FieldKind, FieldSetting, JsonScalarType, JsonShape, LoopSetting, Node, ParsedDocument};
use crate::path::normalize_id;
use crate::relations::detect_relations;
use serde_json::Value;

/// Parse a JSON document into the shared template tuple.
pub fn parse(text: &str) -> ParseResult<ParsedDocument> {
    let normalized = super::normalize_text(text);
    let value: Value = serde_json::from_str(&normalized).map_err(|err| {
        ParseError::JsonParse(ParseError::at(err.line(), err.column()))
    })?;

    let mut loops = Vec::new();
    let root = build_node(&value, "root", "/root", &mut loops);

    let mut fields = Vec::new();
    flatten_fields(&root, "/root", &mut fields);

    let relations = detect_relations(&fields);

    Ok(ParsedDocument {
        root,
        fields,
        loops,
        relations,
        delimiter: None,
    })
}

/// Build a generic node for a JSON value at the given concrete path.
///
/// Empty arrays get a null placeholder representative so the structure
/// stays addressable; loop counts are clamped to >= 1.
fn build_node(value: &Value, tag: &str, path: &str, loops: &mut Vec<LoopSetting>) -> Node {
    match value {
        Value::Array(items) => {
            let loop_id = format!("{}[]", path);
            loops.push(LoopSetting::new(loop_id.clone(), items.len().max(1)));
            let item_value = items.first().unwrap_or(&Value::Null);
            let item = build_node(item_value, "[]", &loop_id, loops);
            let mut node = Node::container(tag);
            node.children = vec![item];
            node.json_shape = Some(JsonShape::Array);
            node.loop_id = Some(loop_id);
            node
        }
        Value::Object(map) => {
            let mut node = Node::container(tag);
            node.json_shape = Some(JsonShape::Object);
            node.children = map
                .iter()
                .map(|(key, entry)| build_node(entry, key, &format!("{}/{}", path, key), loops))
                .collect();
            node
        }
        scalar => Node::json_leaf(
            tag,
            scalar_to_string(scalar),
            scalar_kind(scalar),
            original_type(scalar),
        ),
    }
}

/// Walk the tree producing one field per scalar leaf; containers and
/// arrays are never fields themselves.
fn flatten_fields(node: &Node, path: &str, fields: &mut Vec<FieldSetting>) {
    match node.json_shape {
        Some(JsonShape::Value) => {
            let value = node.json_value.clone().unwrap_or_default();
            let kind = node.json_value_kind;
            fields.push(FieldSetting::new(normalize_id(path), value, kind));
        }
        Some(JsonShape::Array) => {
            if let Some(item) = node.children.first() {
                flatten_fields(item, &format!("{}[]", path), fields);
            }
        }
        _ => {
            for child in &node.children {
                flatten_fields(child, &format!("{}/{}", path, child.tag), fields);
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

/// Kind of a JSON scalar. String values can only refine to number or date;
/// boolean and null kinds require the matching JSON literal.
fn scalar_kind(value: &Value) -> FieldKind {
    match value {
        Value::Null => FieldKind::Null,
        Value::Bool(_) => FieldKind::Boolean,
        Value::Number(_) => FieldKind::Number,
        Value::String(s) => match FieldKind::detect(s) {
            FieldKind::Number => FieldKind::Number,
            FieldKind::Date => FieldKind::Date,
            _ => FieldKind::Text,
        },
        _ => FieldKind::Text,
    }
}

fn original_type(value: &Value) -> JsonScalarType {
    match value {
        Value::Null => JsonScalarType::Null,
        Value::Bool(_) => JsonScalarType::Boolean,
        Value::Number(_) => JsonScalarType::Number,
        _ => JsonScalarType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  "customer": "ACME",
  "active": true,
  "note": null,
  "items": [
    {"sku": "A-1", "qty": 2, "shipped": "2024-01-15"},
    {"sku": "B-2", "qty": 5, "shipped": "2024-02-01"}
  ]
}"#;

    #[test]
    fn test_array_becomes_loop_with_length_count() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.loops.len(), 1);
        assert_eq!(parsed.loops[0].id, "/root/items[]");
        assert_eq!(parsed.loops[0].count, 2);
    }

    #[test]
    fn test_fields_carry_literal_kinds() {
        let parsed = parse(SAMPLE).unwrap();
        let by_id = |id: &str| parsed.fields.iter().find(|f| f.id == id).unwrap();
        assert_eq!(by_id("root/customer").kind, FieldKind::Text);
        assert_eq!(by_id("root/active").kind, FieldKind::Boolean);
        assert_eq!(by_id("root/note").kind, FieldKind::Null);
        assert_eq!(by_id("root/items[]/qty").kind, FieldKind::Number);
        assert_eq!(by_id("root/items[]/shipped").kind, FieldKind::Date);
    }

    #[test]
    fn test_representative_built_from_first_element() {
        let parsed = parse(SAMPLE).unwrap();
        let items = &parsed.root.children[3];
        assert_eq!(items.json_shape, Some(JsonShape::Array));
        assert_eq!(items.children.len(), 1);
        let sku = &items.children[0].children[0];
        assert_eq!(sku.json_value.as_deref(), Some("A-1"));
    }

    #[test]
    fn test_empty_array_gets_null_placeholder() {
        let parsed = parse(r#"{"items": []}"#).unwrap();
        assert_eq!(parsed.loops[0].count, 1);
        let item = &parsed.root.children[0].children[0];
        assert_eq!(item.json_original_type, Some(JsonScalarType::Null));
    }

    #[test]
    fn test_object_key_order_preserved() {
        let parsed = parse(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        let tags: Vec<&str> = parsed.root.children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_malformed_json_reports_line_and_col() {
        let err = parse("{\n  \"a\": oops\n}").unwrap_err();
        match err {
            ParseError::JsonParse(detail) => {
                assert!(detail.contains("line 2"), "detail: {}", detail);
            }
            other => panic!("expected JsonParse, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_root_document() {
        let parsed = parse("42").unwrap();
        assert!(parsed.loops.is_empty());
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].id, "root");
        assert_eq!(parsed.fields[0].kind, FieldKind::Number);
    }
}
