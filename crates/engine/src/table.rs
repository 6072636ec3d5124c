use std::collections::HashSet;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cell::Cell;
use crate::error::MatchError;

/// A named, immutable table. Every row holds exactly one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from decoded rows.
    ///
    /// Short rows are padded with `Empty`. Rows wider than the header and
    /// duplicate column names are rejected.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, MatchError> {
        let name = name.into();

        let mut seen = HashSet::new();
        let duplicates: Vec<String> = columns
            .iter()
            .filter(|c| !seen.insert(c.as_str()))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(MatchError::InvalidTable {
                table: name,
                reason: format!("duplicate column names: {}", duplicates.join(", ")),
            });
        }

        let width = columns.len();
        let mut normalized = Vec::with_capacity(rows.len());
        for (idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(MatchError::InvalidTable {
                    table: name,
                    reason: format!("row {} has {} cells but only {width} columns", idx + 1, row.len()),
                });
            }
            row.resize(width, Cell::Empty);
            normalized.push(row);
        }

        Ok(Self { name, columns, rows: normalized })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Resolve several columns at once, reporting every missing name.
    pub fn require_columns(&self, columns: &[String]) -> Result<Vec<usize>, MatchError> {
        let mut found = Vec::with_capacity(columns.len());
        let mut missing = Vec::new();
        for col in columns {
            match self.column_index(col) {
                Some(idx) => found.push(idx),
                None => missing.push(col.clone()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(MatchError::invalid_columns(&self.name, missing))
        }
    }

    pub fn require_column(&self, column: &str) -> Result<usize, MatchError> {
        self.column_index(column)
            .ok_or_else(|| MatchError::invalid_columns(&self.name, vec![column.to_string()]))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn record(&self, row: usize) -> Option<Record> {
        self.rows.get(row).map(|cells| Record::from_row(&self.columns, cells))
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|cells| Record::from_row(&self.columns, cells))
            .collect()
    }

    /// Same table under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// One page of rows (1-based page numbers). Pages past the end are empty.
    pub fn page(&self, page: usize, page_size: usize) -> Vec<Record> {
        let start = page.saturating_sub(1).saturating_mul(page_size);
        self.rows
            .iter()
            .skip(start)
            .take(page_size)
            .map(|cells| Record::from_row(&self.columns, cells))
            .collect()
    }

    pub(crate) fn from_parts(name: String, columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { name, columns, rows }
    }
}

/// One row paired with its column names, in column order.
/// Serializes as a JSON object whose key order follows the columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Cell)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_row(columns: &[String], cells: &[Cell]) -> Self {
        Self {
            fields: columns.iter().cloned().zip(cells.iter().cloned()).collect(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, cell: impl Into<Cell>) -> Self {
        self.insert(column, cell);
        self
    }

    /// Set a field, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, cell: impl Into<Cell>) {
        let column = column.into();
        let cell = cell.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = cell,
            None => self.fields.push((column, cell)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, cell) in &self.fields {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON object of column -> value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Record, A::Error> {
                let mut record = Record::new();
                while let Some((column, cell)) = map.next_entry::<String, Cell>()? {
                    record.insert(column, cell);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}
