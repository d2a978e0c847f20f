//! Value-equality relation detection.
//!
//! Fields sharing an identical, non-trivial trimmed value are linked: the
//! first-encountered field in a value group becomes master, every other
//! member a dependent. A dependent's generated value always derives from
//! its master (`prefix + master + suffix`) while the relation is enabled.
//! This is a pure value-equality heuristic, no name-based matching.

use crate::model::{FieldSetting, Relation};
use std::collections::HashMap;

/// Values shorter than this never form relations.
pub const MIN_RELATION_LENGTH: usize = 3;

/// Group fields by trimmed value and emit one master->dependent relation
/// per additional member. Boolean-literal and `null` strings are excluded,
/// as are values shorter than [`MIN_RELATION_LENGTH`].
pub fn detect_relations(fields: &[FieldSetting]) -> Vec<Relation> {
    let mut groups: HashMap<&str, Vec<&FieldSetting>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for field in fields {
        let value = field.value.trim();
        if value.len() < MIN_RELATION_LENGTH {
            continue;
        }
        let lowered = value.to_lowercase();
        if lowered == "true" || lowered == "false" || lowered == "null" {
            continue;
        }
        let entry = groups.entry(value).or_default();
        if entry.is_empty() {
            order.push(value);
        }
        entry.push(field);
    }

    let mut relations = Vec::new();
    let mut seen = HashMap::new();
    for value in order {
        let group = &groups[value];
        if group.len() < 2 {
            continue;
        }
        let master = group[0];
        for dependent in &group[1..] {
            let rel = Relation::exact(&master.id, &dependent.id);
            if seen.insert(rel.id.clone(), ()).is_none() {
                relations.push(rel);
            }
        }
    }
    relations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, value: &str) -> FieldSetting {
        FieldSetting::new(id, value, None)
    }

    #[test]
    fn test_shared_value_links_first_as_master() {
        let fields = vec![field("a", "X123"), field("b", "X123"), field("c", "Y9")];
        let relations = detect_relations(&fields);

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].master_id, "a");
        assert_eq!(relations[0].dependent_id, "b");
        assert!(relations[0].enabled);
        assert!(relations.iter().all(|r| r.master_id != "c" && r.dependent_id != "c"));
    }

    #[test]
    fn test_short_values_excluded() {
        let fields = vec![field("a", "ab"), field("b", "ab")];
        assert!(detect_relations(&fields).is_empty());
    }

    #[test]
    fn test_boolean_and_null_literals_excluded() {
        let fields = vec![
            field("a", "true"),
            field("b", "TRUE"),
            field("c", "null"),
            field("d", "null"),
        ];
        assert!(detect_relations(&fields).is_empty());
    }

    #[test]
    fn test_three_way_group_yields_two_relations() {
        let fields = vec![field("a", "SAME1"), field("b", "SAME1"), field("c", "SAME1")];
        let relations = detect_relations(&fields);

        assert_eq!(relations.len(), 2);
        assert!(relations.iter().all(|r| r.master_id == "a"));
        let dependents: Vec<&str> = relations.iter().map(|r| r.dependent_id.as_str()).collect();
        assert_eq!(dependents, vec!["b", "c"]);
    }

    #[test]
    fn test_values_trimmed_before_grouping() {
        let fields = vec![field("a", "  X123  "), field("b", "X123")];
        let relations = detect_relations(&fields);
        assert_eq!(relations.len(), 1);
    }
}
