//! XML parser: standards-compliant parse via roxmltree, then loop
//! normalization, field flattening and relation detection.

use crate::error::{ParseError, ParseResult};
use crate::model::{Attr, Node, ParsedDocument};
use crate::relations::detect_relations;
use crate::tree::{flatten_fields, normalize_loops};

/// Parse an XML document into the shared template tuple.
///
/// Attributes keep source order; leaf text is kept raw here and trimmed
/// only at flatten time. Well-formedness failures surface as
/// [`ParseError::XmlParse`] with the parser's reported position.
pub fn parse(text: &str) -> ParseResult<ParsedDocument> {
    let normalized = super::normalize_text(text);
    let doc = roxmltree::Document::parse(&normalized).map_err(|err| {
        let pos = err.pos();
        ParseError::XmlParse(format!(
            "{} ({})",
            err,
            ParseError::at(pos.row as usize, pos.col as usize)
        ))
    })?;

    let root = build_node(doc.root_element());
    let root_path = format!("/{}", root.tag);

    let mut loops = Vec::new();
    let root = normalize_loops(root, &root_path, &mut loops);

    let mut fields = Vec::new();
    flatten_fields(&root, &root_path, &mut fields);

    let relations = detect_relations(&fields);

    Ok(ParsedDocument {
        root,
        fields,
        loops,
        relations,
        delimiter: None,
    })
}

/// Build a generic node from a parsed element. Elements without element
/// children become leaves carrying their concatenated text content.
fn build_node(element: roxmltree::Node<'_, '_>) -> Node {
    let mut node = Node::container(element.tag_name().name());
    node.attrs = element
        .attributes()
        .map(|attr| Attr {
            name: attr.name().to_string(),
            value: attr.value().to_string(),
        })
        .collect();
    node.children = element
        .children()
        .filter(|child| child.is_element())
        .map(build_node)
        .collect();
    if node.children.is_empty() {
        let text: String = element
            .children()
            .filter(|child| child.is_text())
            .filter_map(|child| child.text())
            .collect();
        node.text = Some(text);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    const ORDERS: &str = r#"<orders version="2">
  <order ref="R-100">
    <id>1001</id>
    <date>2024-01-15</date>
  </order>
  <order ref="R-101">
    <id>1002</id>
    <date>2024-01-16</date>
  </order>
  <order ref="R-102">
    <id>1003</id>
    <date>2024-01-17</date>
  </order>
</orders>"#;

    #[test]
    fn test_parse_detects_loop_with_exact_count() {
        let parsed = parse(ORDERS).unwrap();
        assert_eq!(parsed.loops.len(), 1);
        assert_eq!(parsed.loops[0].id, "/orders/order");
        assert_eq!(parsed.loops[0].count, 3);
        // only the representative survives
        assert_eq!(parsed.root.children.len(), 1);
    }

    #[test]
    fn test_parse_flattens_attributes_and_leaves() {
        let parsed = parse(ORDERS).unwrap();
        let ids: Vec<&str> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "orders/@version",
                "orders/order[]/@ref",
                "orders/order[]/id",
                "orders/order[]/date",
            ]
        );
        assert_eq!(parsed.fields[2].kind, FieldKind::Number);
        assert_eq!(parsed.fields[3].kind, FieldKind::Date);
    }

    #[test]
    fn test_malformed_xml_reports_position() {
        let err = parse("<root>\n  <broken>\n</root>").unwrap_err();
        match err {
            ParseError::XmlParse(detail) => assert!(detail.contains("line")),
            other => panic!("expected XmlParse, got {:?}", other),
        }
    }

    #[test]
    fn test_attribute_source_order_preserved() {
        let parsed = parse(r#"<a z="1" b="2" m="3"/>"#).unwrap();
        let names: Vec<&str> = parsed.root.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["z", "b", "m"]);
    }

    #[test]
    fn test_blank_leaf_produces_no_field() {
        let parsed = parse("<root><empty>   </empty><id>A42</id></root>").unwrap();
        let ids: Vec<&str> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["root/id"]);
    }

    #[test]
    fn test_shared_values_yield_relations() {
        let parsed = parse("<r><a>X123</a><b>X123</b><c>zz</c></r>").unwrap();
        assert_eq!(parsed.relations.len(), 1);
        assert_eq!(parsed.relations[0].master_id, "r/a");
        assert_eq!(parsed.relations[0].dependent_id, "r/b");
    }
}
