//! CSV parser: delimiter detection plus RFC4180 record reading via the
//! csv crate, normalized into a synthetic repeating "row" tree.
//!
//! The root is an array container with one representative row object whose
//! children are the header columns; one loop (`root[]`) covers the rows.
//! Column kinds are inferred by sampling every non-blank value in the
//! column; mixed kinds collapse the column to text.

use crate::error::{ParseError, ParseResult};
use crate::model::{
    FieldKind, FieldSetting, JsonScalarType, JsonShape, LoopSetting, Node, ParsedDocument,
};
use crate::relations::detect_relations;

const DELIMITERS: [char; 3] = [';', ',', '\t'];

/// Detect the delimiter by counting unquoted occurrences on the first
/// non-blank line; the highest count wins, ties keep `;`.
pub fn detect_delimiter(line: &str) -> char {
    let mut best = ';';
    let mut best_count: i64 = -1;
    for delim in DELIMITERS {
        let count = count_unquoted(line, delim) as i64;
        if count > best_count {
            best = delim;
            best_count = count;
        }
    }
    best
}

fn count_unquoted(line: &str, delimiter: char) -> usize {
    let mut count = 0;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
            continue;
        }
        if !in_quotes && ch == delimiter {
            count += 1;
        }
    }
    count
}

/// Parse a CSV document into the shared template tuple. A forced
/// `delimiter` overrides detection.
pub fn parse(text: &str, delimiter: Option<char>) -> ParseResult<ParsedDocument> {
    let normalized = super::normalize_text(text);
    let first_line = normalized
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ParseError::CsvParse("empty document".into()))?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(first_line));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(normalized.as_bytes());

    let mut records = reader.records();
    let header_record = records
        .next()
        .ok_or_else(|| ParseError::CsvParse("empty document".into()))?
        .map_err(|err| ParseError::CsvParse(err.to_string()))?;

    let columns = unique_columns(&header_record);
    if columns.is_empty() {
        return Err(ParseError::CsvParse("no header columns".into()));
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in records {
        let record = record.map_err(|err| ParseError::CsvParse(err.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    let mut column_values: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];
    for row in &rows {
        for (i, values) in column_values.iter_mut().enumerate() {
            values.push(row.get(i).map(String::as_str).unwrap_or(""));
        }
    }

    let kinds: Vec<FieldKind> = column_values.iter().map(|v| infer_column_kind(v)).collect();
    let samples: Vec<&str> = column_values.iter().map(|v| pick_sample(v)).collect();

    let mut row_node = Node::container("[]");
    row_node.json_shape = Some(JsonShape::Object);
    for (i, ((column, kind), sample)) in columns.iter().zip(&kinds).zip(&samples).enumerate() {
        let mut leaf = Node::json_leaf(column, *sample, *kind, JsonScalarType::String);
        leaf.csv_values = column_values[i].iter().map(|v| v.to_string()).collect();
        row_node.children.push(leaf);
    }

    let mut root = Node::container("root");
    root.json_shape = Some(JsonShape::Array);
    root.loop_id = Some("root[]".to_string());
    root.children = vec![row_node];

    let loops = vec![LoopSetting::new("root[]", rows.len().max(1))];

    let fields: Vec<FieldSetting> = columns
        .iter()
        .zip(&kinds)
        .zip(&samples)
        .map(|((column, kind), sample)| {
            FieldSetting::new(format!("root[]/{}", column), *sample, Some(*kind))
        })
        .collect();

    let relations = detect_relations(&fields);

    Ok(ParsedDocument {
        root,
        fields,
        loops,
        relations,
        delimiter: Some(delimiter),
    })
}

/// Trimmed header names: blanks become `column_N`, collisions get a
/// numeric suffix.
fn unique_columns(header: &csv::StringRecord) -> Vec<String> {
    let mut columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                format!("column_{}", i + 1)
            } else {
                trimmed.to_string()
            }
        })
        .collect();

    let mut seen = std::collections::HashMap::new();
    for column in columns.iter_mut() {
        let count = seen.entry(column.clone()).or_insert(0usize);
        *count += 1;
        if *count > 1 {
            *column = format!("{}_{}", column, count);
        }
    }
    columns
}

/// Kind shared by every non-blank value in the column, or text on mixture.
/// Literal `null` strings are ignored while sampling.
fn infer_column_kind(values: &[&str]) -> FieldKind {
    let mut chosen: Option<FieldKind> = None;
    for raw in values {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            continue;
        }
        let detected = FieldKind::detect(trimmed);
        match chosen {
            None => chosen = Some(detected),
            Some(kind) if kind != detected => return FieldKind::Text,
            _ => {}
        }
    }
    chosen.unwrap_or(FieldKind::Text)
}

fn pick_sample<'a>(values: &[&'a str]) -> &'a str {
    values
        .iter()
        .find(|raw| !raw.trim().is_empty())
        .copied()
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter_prefers_max_count() {
        assert_eq!(detect_delimiter("a;b;c"), ';');
        assert_eq!(detect_delimiter("a,b,c"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
    }

    #[test]
    fn test_detect_delimiter_tie_keeps_semicolon() {
        assert_eq!(detect_delimiter("a"), ';');
        assert_eq!(detect_delimiter("a;b,c"), ';');
    }

    #[test]
    fn test_detect_delimiter_ignores_quoted() {
        assert_eq!(detect_delimiter(r#""a,b,c";"d";"e""#), ';');
    }

    #[test]
    fn test_parse_builds_row_loop() {
        let parsed = parse("id;name\n1;Alice\n2;Bob\n3;Carol", None).unwrap();
        assert_eq!(parsed.delimiter, Some(';'));
        assert_eq!(parsed.loops.len(), 1);
        assert_eq!(parsed.loops[0].id, "root[]");
        assert_eq!(parsed.loops[0].count, 3);

        let ids: Vec<&str> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["root[]/id", "root[]/name"]);
        assert_eq!(parsed.fields[0].kind, FieldKind::Number);
        assert_eq!(parsed.fields[0].value, "1");
    }

    #[test]
    fn test_mixed_column_collapses_to_text() {
        let parsed = parse("v\n42\nhello\n7", None).unwrap();
        assert_eq!(parsed.fields[0].kind, FieldKind::Text);
    }

    #[test]
    fn test_header_collisions_get_suffix() {
        let parsed = parse("a;a;;a\n1;2;3;4", None).unwrap();
        let ids: Vec<&str> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["root[]/a", "root[]/a_2", "root[]/column_3", "root[]/a_3"]);
    }

    #[test]
    fn test_empty_document_is_parse_error() {
        assert!(matches!(parse("", None), Err(ParseError::CsvParse(_))));
        assert!(matches!(parse("  \n  \n", None), Err(ParseError::CsvParse(_))));
    }

    #[test]
    fn test_quoted_values_with_embedded_delimiter() {
        let parsed = parse("name,desc\nWidget,\"small, round\"", None).unwrap();
        assert_eq!(parsed.delimiter, Some(','));
        assert_eq!(parsed.fields[1].value, "small, round");
    }

    #[test]
    fn test_headerless_data_row_count_minimum_one() {
        let parsed = parse("only_header;cols", None).unwrap();
        assert_eq!(parsed.loops[0].count, 1);
    }

    #[test]
    fn test_forced_delimiter_overrides_detection() {
        let parsed = parse("a,b;c\n1,2;3", Some(',')).unwrap();
        let ids: Vec<&str> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["root[]/a", "root[]/b;c"]);
    }
}
