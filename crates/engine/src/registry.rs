//! Lock-guarded set of loaded tables.
//!
//! Tables are stored behind `Arc`, so a reader keeps the exact table it
//! looked up even if a writer replaces or deletes that name afterwards.
//! Writers swap whole tables; nothing is ever mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::table::Table;

/// Summary of one loaded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "rows")]
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl TableInfo {
    pub fn of(table: &Table) -> Self {
        Self {
            name: table.name().to_string(),
            row_count: table.row_count(),
            columns: table.columns().to_vec(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from previously persisted tables.
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let map = tables
            .into_iter()
            .map(|t| (t.name().to_string(), Arc::new(t)))
            .collect();
        Self { tables: RwLock::new(map) }
    }

    /// Insert under the table's own name, replacing any previous table.
    pub fn put(&self, table: Table) -> Option<Arc<Table>> {
        let name = table.name().to_string();
        log::debug!("registry put '{}' ({} rows)", name, table.row_count());
        self.tables.write().insert(name, Arc::new(table))
    }

    pub fn get(&self, name: &str) -> Result<Arc<Table>, MatchError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MatchError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Loaded tables, ordered by name.
    pub fn list(&self) -> Vec<TableInfo> {
        self.tables
            .read()
            .values()
            .map(|t| TableInfo::of(t))
            .collect()
    }

    pub fn delete(&self, name: &str) -> Result<Arc<Table>, MatchError> {
        let removed = self.tables.write().remove(name);
        match removed {
            Some(table) => {
                log::debug!("registry delete '{}'", name);
                Ok(table)
            }
            None => Err(MatchError::not_found(name)),
        }
    }

    /// Cheap copy of the current table set for persistence.
    /// Only `Arc` handles are cloned while the read lock is held.
    pub fn snapshot(&self) -> Vec<Arc<Table>> {
        self.tables.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn table(name: &str, rows: usize) -> Table {
        let data = (0..rows).map(|i| vec![Cell::Number(i as f64)]).collect();
        Table::new(name, vec!["n".into()], data).unwrap()
    }

    #[test]
    fn put_overwrites_by_name() {
        let reg = TableRegistry::new();
        assert!(reg.put(table("a", 1)).is_none());
        let previous = reg.put(table("a", 3)).unwrap();
        assert_eq!(previous.row_count(), 1);
        assert_eq!(reg.get("a").unwrap().row_count(), 3);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_and_delete_unknown_fail_not_found() {
        let reg = TableRegistry::new();
        assert_eq!(reg.get("missing").unwrap_err(), MatchError::not_found("missing"));
        assert_eq!(reg.delete("missing").unwrap_err(), MatchError::not_found("missing"));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let reg = TableRegistry::from_tables(vec![table("b", 2), table("a", 1)]);
        let names: Vec<_> = reg.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.list()[1].row_count, 2);
    }

    #[test]
    fn reader_keeps_its_table_across_replace() {
        let reg = TableRegistry::new();
        reg.put(table("a", 1));
        let held = reg.get("a").unwrap();
        reg.put(table("a", 5));
        reg.delete("a").unwrap();
        assert_eq!(held.row_count(), 1);
        assert!(!reg.contains("a"));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let reg = Arc::new(TableRegistry::new());
        reg.put(table("a", 2));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i == 0 {
                            reg.put(table("a", 2));
                        } else {
                            let t = reg.get("a").unwrap();
                            assert_eq!(t.row_count(), 2);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
