//! Template path addressing.
//!
//! A template path is the canonical string address of a structural position:
//! every concrete repetition index (`[3]`) collapses to the bare marker
//! (`[]`) and the leading slash is dropped, so two instances of the same
//! repeated node share one address. Every other component (field settings,
//! loop settings, relations, generation) keys off these paths, so the
//! functions here must stay pure and collision-free.

use once_cell::sync::Lazy;
use regex::Regex;

static INDEX_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("index regex"));

/// Drop a single leading slash.
pub fn normalize_id(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Collapse concrete indices and drop the leading slash:
/// `/root/items/item[3]/name` -> `root/items/item[]/name`.
pub fn to_template_path(concrete: &str) -> String {
    normalize_id(&INDEX_MARKER_RE.replace_all(concrete, "[]")).to_string()
}

/// Remove loop markers entirely, for using a path as a lookup key
/// irrespective of marker presence.
pub fn strip_loop_markers(path: &str) -> String {
    path.replace("[]", "")
}

/// Canonical loop id: the path with markers stripped, so XML loop ids
/// (plain paths) and JSON/CSV loop ids (trailing `[]`) agree in shape.
pub fn normalize_loop_id(path: &str) -> String {
    strip_loop_markers(path)
}
