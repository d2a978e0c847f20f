//! Domain models shared across parsing, editing and generation.
//!
//! This module contains the core data structures of the template model:
//!
//! - [`Node`] - generic tree element unifying XML/JSON/CSV structure
//! - [`FieldSetting`] - a leaf value's generation rule and parameters
//! - [`LoopSetting`] - a repeating group's output cardinality
//! - [`Relation`] - a master/dependent value link
//! - [`TemplatePayload`] - the persisted template bundle
//! - [`FieldKind`] / [`FieldMode`] - inferred value type and generation strategy

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// =============================================================================
// Formats and Kinds
// =============================================================================

/// Source/target document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Xml,
    Json,
    Csv,
}

impl DataFormat {
    /// File extension used for generated output.
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Xml => "xml",
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xml" => Ok(DataFormat::Xml),
            "json" => Ok(DataFormat::Json),
            "csv" => Ok(DataFormat::Csv),
            other => Err(format!("Unknown format: {}", other)),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Structural role of a node in a JSON-derived tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonShape {
    Object,
    Array,
    Value,
}

/// The JSON type a scalar leaf originally had, so regeneration can emit
/// numbers/booleans/null instead of quoting everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonScalarType {
    String,
    Number,
    Boolean,
    Null,
}

/// Inferred primitive type of a field's sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Boolean,
    Null,
}

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("number regex"));
static DATE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date regex"));

impl FieldKind {
    /// Detect the kind of a bare string value.
    ///
    /// Only text, number and date can come out of a string; boolean and null
    /// kinds apply only where a JSON literal boolean/null was present, so
    /// `"true"` in an XML leaf or CSV cell stays text.
    pub fn detect(value: &str) -> FieldKind {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return FieldKind::Text;
        }
        if NUMBER_RE.is_match(trimmed) {
            return FieldKind::Number;
        }
        if DATE_PREFIX_RE.is_match(trimmed)
            && chrono::NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d").is_ok()
        {
            return FieldKind::Date;
        }
        FieldKind::Text
    }
}

// =============================================================================
// Generation Modes
// =============================================================================

/// Value-generation strategy for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    #[default]
    Same,
    Fixed,
    Increment,
    Random,
    List,
}

/// Scope of a list-mode field's line consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListScope {
    #[default]
    PerFile,
    Global,
}

/// The set of modes a field of the given kind may use.
///
/// Consulted both by editing surfaces and by the generation engine's
/// normalization, so the constraint lives in exactly one place.
pub fn allowed_modes(kind: FieldKind) -> &'static [FieldMode] {
    match kind {
        FieldKind::Null => &[FieldMode::Same],
        FieldKind::Boolean => &[FieldMode::Same, FieldMode::Fixed, FieldMode::Random],
        _ => &[
            FieldMode::Same,
            FieldMode::Fixed,
            FieldMode::Increment,
            FieldMode::Random,
            FieldMode::List,
        ],
    }
}

// =============================================================================
// Node Tree
// =============================================================================

/// An attribute on an XML node, kept in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// Generic tree element representing one structural position.
///
/// XML, JSON and CSV all normalize into this one shape; the optional JSON
/// metadata distinguishes object/array/value nodes and remembers original
/// scalar types. A node is either a container (has children) or a leaf
/// (has text/value, no children). The tree is a snapshot: edits and
/// loop-marker toggling build new trees rather than mutating shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Tag (XML element name) or key (JSON property / CSV column).
    pub tag: String,

    /// XML attributes in source order; empty for JSON/CSV.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<Attr>,

    /// Child nodes in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,

    /// Raw text for XML leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Set when this node is the representative of a detected repeating group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_id: Option<String>,

    /// Structural role for JSON/CSV-derived trees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_shape: Option<JsonShape>,

    /// Scalar value for JSON/CSV leaves, stringified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value: Option<String>,

    /// Inferred kind of the scalar value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value_kind: Option<FieldKind>,

    /// Original JSON scalar type, for faithful regeneration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_original_type: Option<JsonScalarType>,

    /// All original column values, CSV leaves only. Lets same-mode
    /// regeneration reproduce the source rows instead of repeating the
    /// sample.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub csv_values: Vec<String>,
}

impl Node {
    /// A container node with no metadata.
    pub fn container(tag: impl Into<String>) -> Self {
        Node {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
            loop_id: None,
            json_shape: None,
            json_value: None,
            json_value_kind: None,
            json_original_type: None,
            csv_values: Vec::new(),
        }
    }

    /// An XML leaf carrying raw text.
    pub fn xml_leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Node::container(tag);
        node.text = Some(text.into());
        node
    }

    /// A JSON/CSV scalar leaf.
    pub fn json_leaf(
        tag: impl Into<String>,
        value: impl Into<String>,
        kind: FieldKind,
        original: JsonScalarType,
    ) -> Self {
        let mut node = Node::container(tag);
        node.json_shape = Some(JsonShape::Value);
        node.json_value = Some(value.into());
        node.json_value_kind = Some(kind);
        node.json_original_type = Some(original);
        node
    }

    /// True when this node carries a value rather than children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// =============================================================================
// Field Settings
// =============================================================================

/// Per-field generation rule with mode-specific parameters.
///
/// Created at flatten time with `mode = same`; only user edits mutate it,
/// and it is never deleted except on full reparse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSetting {
    /// Template path of the leaf (plus `/@name` for XML attributes).
    pub id: String,
    /// Display label; same as the id.
    pub label: String,
    /// Original sampled value.
    pub value: String,
    /// Inferred kind of the sample.
    pub kind: FieldKind,
    /// Generation strategy.
    pub mode: FieldMode,
    /// Increment step (numbers and dates).
    pub step: i64,
    /// Random range lower bound (numbers without a digit length).
    pub min: i64,
    /// Random range upper bound.
    pub max: i64,
    /// Random digit count (numbers) or string length (text); 0 disables
    /// the digit-length path for numbers.
    pub length: usize,
    /// Random date offset window in days.
    pub date_span_days: i64,
    /// Value used verbatim in fixed mode.
    pub fixed_value: String,
    /// Newline-delimited value list for list mode.
    #[serde(default)]
    pub list_text: String,
    /// How list lines map onto files/loop iterations.
    #[serde(default)]
    pub list_scope: ListScope,
}

impl FieldSetting {
    /// Create a field setting from a flattened leaf, inferring the kind
    /// from the sample unless the parser already knows it.
    pub fn new(id: impl Into<String>, value: impl Into<String>, kind: Option<FieldKind>) -> Self {
        let id = id.into();
        let value = value.into();
        let kind = kind.unwrap_or_else(|| FieldKind::detect(&value));
        FieldSetting {
            label: id.clone(),
            id,
            kind,
            mode: FieldMode::Same,
            step: 1,
            min: 0,
            max: 9999,
            length: value.len().max(6),
            date_span_days: 30,
            fixed_value: value.clone(),
            value,
            list_text: String::new(),
            list_scope: ListScope::PerFile,
        }
    }

    /// Clamp the mode to the set the kind allows, falling back to `same`.
    ///
    /// Applied when loading round-tripped settings from storage.
    pub fn normalize(mut self) -> Self {
        if !allowed_modes(self.kind).contains(&self.mode) {
            self.mode = FieldMode::Same;
        }
        if self.date_span_days < 1 {
            self.date_span_days = 30;
        }
        if self.fixed_value.is_empty() && self.mode != FieldMode::Fixed {
            self.fixed_value = self.value.clone();
        }
        self
    }

    /// Non-blank lines of the list text.
    pub fn list_lines(&self) -> Vec<&str> {
        self.list_text
            .split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

// =============================================================================
// Loop Settings
// =============================================================================

/// A detected repeating group and its desired output cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSetting {
    /// Wildcarded template path of the repeated node.
    pub id: String,
    /// Display label; same as the id.
    pub label: String,
    /// Output repetition count, always >= 1.
    pub count: usize,
}

impl LoopSetting {
    pub fn new(id: impl Into<String>, count: usize) -> Self {
        let id = id.into();
        LoopSetting {
            label: id.clone(),
            id,
            count: count.max(1),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

/// A detected equality link: the dependent's generated value derives from
/// the master's resolved value as `prefix + master + suffix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub master_id: String,
    pub dependent_id: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Relation {
    pub fn exact(master_id: &str, dependent_id: &str) -> Self {
        Relation {
            id: format!("{}::{}::exact", master_id, dependent_id),
            master_id: master_id.to_string(),
            dependent_id: dependent_id.to_string(),
            prefix: String::new(),
            suffix: String::new(),
            enabled: true,
        }
    }
}

// =============================================================================
// Parsed Document
// =============================================================================

/// The tuple produced on upload, edit-commit and template load.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    pub root: Node,
    pub fields: Vec<FieldSetting>,
    pub loops: Vec<LoopSetting>,
    pub relations: Vec<Relation>,
    /// Detected delimiter, CSV only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
}

// =============================================================================
// Template Payload
// =============================================================================

/// Persisted template bundle, fully overwritten on re-save with the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub category: String,
    /// Raw source text the tree was parsed from.
    pub source_text: String,
    #[serde(default)]
    pub format: DataFormat,
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
    pub fields: Vec<FieldSetting>,
    pub loops: Vec<LoopSetting>,
    pub relations: Vec<Relation>,
    pub file_name: String,
    /// RFC3339 timestamp of the last save; stamped by the registry.
    #[serde(default)]
    pub saved_at: String,
}

fn default_delimiter() -> char {
    ';'
}

/// File name without its final extension.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind_number() {
        assert_eq!(FieldKind::detect("42"), FieldKind::Number);
        assert_eq!(FieldKind::detect("-3.25"), FieldKind::Number);
        assert_eq!(FieldKind::detect(" 7 "), FieldKind::Number);
    }

    #[test]
    fn test_detect_kind_date() {
        assert_eq!(FieldKind::detect("2024-01-15"), FieldKind::Date);
        assert_eq!(FieldKind::detect("2024-01-15T10:00:00"), FieldKind::Date);
        // Shape matches but not a real calendar date
        assert_eq!(FieldKind::detect("2024-13-45"), FieldKind::Text);
    }

    #[test]
    fn test_detect_kind_boolean_string_stays_text() {
        // Boolean kind only applies to JSON literal booleans
        assert_eq!(FieldKind::detect("true"), FieldKind::Text);
        assert_eq!(FieldKind::detect("false"), FieldKind::Text);
    }

    #[test]
    fn test_detect_kind_empty() {
        assert_eq!(FieldKind::detect(""), FieldKind::Text);
        assert_eq!(FieldKind::detect("   "), FieldKind::Text);
    }

    #[test]
    fn test_field_setting_defaults() {
        let field = FieldSetting::new("order/id", "ABC123", None);
        assert_eq!(field.mode, FieldMode::Same);
        assert_eq!(field.kind, FieldKind::Text);
        assert_eq!(field.step, 1);
        assert_eq!(field.min, 0);
        assert_eq!(field.max, 9999);
        assert_eq!(field.length, 6);
        assert_eq!(field.date_span_days, 30);
        assert_eq!(field.fixed_value, "ABC123");
    }

    #[test]
    fn test_field_setting_length_follows_value() {
        let field = FieldSetting::new("order/ref", "REFERENCE-1", None);
        assert_eq!(field.length, 11);
    }

    #[test]
    fn test_allowed_modes_by_kind() {
        assert_eq!(allowed_modes(FieldKind::Null), &[FieldMode::Same]);
        assert!(!allowed_modes(FieldKind::Boolean).contains(&FieldMode::Increment));
        assert!(allowed_modes(FieldKind::Boolean).contains(&FieldMode::Random));
        assert_eq!(allowed_modes(FieldKind::Number).len(), 5);
    }

    #[test]
    fn test_normalize_clamps_illegal_mode() {
        let mut field = FieldSetting::new("flag", "true", Some(FieldKind::Boolean));
        field.mode = FieldMode::Increment;
        let field = field.normalize();
        assert_eq!(field.mode, FieldMode::Same);
    }

    #[test]
    fn test_list_lines_skip_blank() {
        let mut field = FieldSetting::new("name", "x", None);
        field.list_text = "alpha\r\n\r\nbeta\n  \ngamma".into();
        assert_eq!(field.list_lines(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_loop_setting_min_count() {
        let loop_setting = LoopSetting::new("root/items/item", 0);
        assert_eq!(loop_setting.count, 1);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("orders.xml"), "orders");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name(".hidden"), ".hidden");
        assert_eq!(base_name("a.b.c.json"), "a.b.c");
    }

    #[test]
    fn test_relation_id_shape() {
        let rel = Relation::exact("a/b", "a/c");
        assert_eq!(rel.id, "a/b::a/c::exact");
        assert!(rel.enabled);
    }
}
