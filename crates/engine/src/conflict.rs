//! Shared key normalization, conflict detection and column naming.
//!
//! Both match variants and both phases of the selection protocol go through
//! these helpers, so a follow-up call sees the same groups, in the same
//! order, as the call that reported the conflicts.

use std::collections::{HashMap, HashSet};

use crate::cell::{Cell, CellKey};
use crate::table::{Record, Table};

/// Suffix appended to an incoming column whose name is already taken.
pub const MATCHED_SUFFIX: &str = "_matched";

/// Composite join key of one row. `None` when any component is empty:
/// blank keys never match anything.
pub fn row_key(cells: &[Cell], key_cols: &[usize]) -> Option<Vec<String>> {
    let mut parts = Vec::with_capacity(key_cols.len());
    for &idx in key_cols {
        let part = cells[idx].join_key();
        if part.is_empty() {
            return None;
        }
        parts.push(part);
    }
    Some(parts)
}

/// Target rows grouped by normalized key, groups in first-seen order.
#[derive(Debug, Default)]
pub struct KeyGroups {
    order: Vec<Vec<String>>,
    rows: HashMap<Vec<String>, Vec<usize>>,
}

impl KeyGroups {
    pub fn build(table: &Table, key_cols: &[usize]) -> Self {
        let mut groups = Self::default();
        for (idx, cells) in table.rows().iter().enumerate() {
            let Some(key) = row_key(cells, key_cols) else {
                continue;
            };
            match groups.rows.get_mut(&key) {
                Some(rows) => rows.push(idx),
                None => {
                    groups.order.push(key.clone());
                    groups.rows.insert(key, vec![idx]);
                }
            }
        }
        groups
    }

    pub fn get(&self, key: &[String]) -> Option<&[usize]> {
        self.rows.get(key).map(|v| v.as_slice())
    }

    /// Groups in the order their key first appears in the table.
    pub fn iter(&self) -> impl Iterator<Item = (&[String], &[usize])> {
        self.order
            .iter()
            .map(move |k| (k.as_slice(), self.rows[k].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Distinct value tuples found for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSet {
    /// Trimmed key text as it appears on the first target row of the group.
    pub key: String,
    /// Normalized join key the group was built on.
    pub normalized: Vec<String>,
    /// Options in first-appearance order. Index = selection value.
    pub options: Vec<Record>,
}

/// Serde adapter writing a conflict list as one JSON object, key -> options,
/// in the order the keys were detected.
///
/// ```json
/// {"1": [{"name": "x"}, {"name": "y"}]}
/// ```
pub mod as_key_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::ConflictSet;
    use crate::cell::normalize_key;
    use crate::table::Record;

    pub fn serialize<S: Serializer>(sets: &[ConflictSet], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(sets.len()))?;
        for set in sets {
            map.serialize_entry(&set.key, &set.options)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ConflictSet>, D::Error> {
        struct KeyMapVisitor;

        impl<'de> Visitor<'de> for KeyMapVisitor {
            type Value = Vec<ConflictSet>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON object of key -> options")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut sets = Vec::new();
                while let Some((key, options)) = map.next_entry::<String, Vec<Record>>()? {
                    sets.push(ConflictSet {
                        normalized: vec![normalize_key(&key)],
                        key,
                        options,
                    });
                }
                Ok(sets)
            }
        }

        deserializer.deserialize_map(KeyMapVisitor)
    }
}

/// Distinct tuples over `value_cols` among `rows`, in first-appearance order.
pub fn distinct_tuples(table: &Table, rows: &[usize], value_cols: &[usize]) -> Vec<Vec<Cell>> {
    let mut seen: HashSet<Vec<CellKey>> = HashSet::new();
    let mut out = Vec::new();
    for &row in rows {
        let cells = &table.rows()[row];
        let tuple: Vec<Cell> = value_cols.iter().map(|&c| cells[c].clone()).collect();
        let key: Vec<CellKey> = tuple.iter().map(Cell::key).collect();
        if seen.insert(key) {
            out.push(tuple);
        }
    }
    out
}

/// Every key whose rows disagree on `value_cols`, in first-seen key order.
pub fn detect_conflicts(
    table: &Table,
    groups: &KeyGroups,
    display_col: usize,
    value_cols: &[usize],
) -> Vec<ConflictSet> {
    let value_names: Vec<String> = value_cols
        .iter()
        .map(|&c| table.columns()[c].clone())
        .collect();

    groups
        .iter()
        .filter(|(_, rows)| rows.len() > 1)
        .filter_map(|(key, rows)| {
            let tuples = distinct_tuples(table, rows, value_cols);
            if tuples.len() <= 1 {
                return None;
            }
            let key_text = table.rows()[rows[0]][display_col].display().trim().to_string();
            Some(ConflictSet {
                key: key_text,
                normalized: key.to_vec(),
                options: tuples
                    .iter()
                    .map(|t| Record::from_row(&value_names, t))
                    .collect(),
            })
        })
        .collect()
}

/// `wanted`, or `wanted` plus one or more suffixes until it is unused.
pub fn unique_column_name(existing: &[String], wanted: &str, suffix: &str) -> String {
    let mut name = wanted.to_string();
    while existing.iter().any(|c| *c == name) {
        name.push_str(suffix);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(rows: &[(&str, &str)]) -> Table {
        Table::new(
            "t",
            vec!["id".into(), "name".into()],
            rows.iter()
                .map(|(k, v)| vec![Cell::from(*k), Cell::from(*v)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn groups_fold_case_and_whitespace() {
        let t = target(&[("A1", "x"), (" a1 ", "y"), ("b", "z")]);
        let g = KeyGroups::build(&t, &[0]);
        assert_eq!(g.len(), 2);
        assert_eq!(g.get(&["a1".to_string()]), Some(&[0usize, 1][..]));
    }

    #[test]
    fn blank_keys_are_skipped() {
        let t = target(&[("", "x"), ("  ", "y"), ("k", "z")]);
        assert_eq!(KeyGroups::build(&t, &[0]).len(), 1);
    }

    #[test]
    fn aab_is_a_two_option_conflict() {
        let t = target(&[("k", "A"), ("k", "A"), ("k", "B")]);
        let g = KeyGroups::build(&t, &[0]);
        let conflicts = detect_conflicts(&t, &g, 0, &[1]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "k");
        assert_eq!(conflicts[0].options.len(), 2);
        assert_eq!(conflicts[0].options[0].get("name"), Some(&Cell::from("A")));
        assert_eq!(conflicts[0].options[1].get("name"), Some(&Cell::from("B")));
    }

    #[test]
    fn aaa_is_not_a_conflict() {
        let t = target(&[("k", "A"), ("k", "A"), ("k", "A")]);
        let g = KeyGroups::build(&t, &[0]);
        assert!(detect_conflicts(&t, &g, 0, &[1]).is_empty());
    }

    #[test]
    fn conflict_key_keeps_first_spelling() {
        let t = target(&[(" Key ", "1"), ("KEY", "2")]);
        let g = KeyGroups::build(&t, &[0]);
        let c = detect_conflicts(&t, &g, 0, &[1]);
        assert_eq!(c[0].key, "Key");
        assert_eq!(c[0].normalized, vec!["key".to_string()]);
    }

    #[test]
    fn unique_name_appends_suffix_repeatedly() {
        let existing = vec!["name".to_string(), "name_matched".to_string()];
        assert_eq!(unique_column_name(&existing, "name", MATCHED_SUFFIX), "name_matched_matched");
        assert_eq!(unique_column_name(&existing, "city", MATCHED_SUFFIX), "city");
    }
}
