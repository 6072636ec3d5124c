//! Rendering boundary: records in, a rectangular sheet out.
//!
//! The builder never joins or searches. It fixes the column order and
//! hands a plain grid to the csv/xlsx/json writers.

use std::path::Path;

use sheetjoin_engine::{Cell, Record, Table};

/// Column-ordered grid ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ExportSheet {
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|cells| Record::from_row(&self.columns, cells))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ExportBuilder {
    name: String,
    columns: Vec<String>,
}

impl ExportBuilder {
    /// Builder with the requested column order.
    pub fn new(columns: Vec<String>) -> Self {
        Self { name: "Export".to_string(), columns }
    }

    /// Sheet name used by formats that have one (xlsx).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Lay `records` out in the requested order.
    ///
    /// Requested columns that no record carries are dropped rather than
    /// padded; repeated requests for one column keep the first position.
    pub fn build(&self, records: &[Record]) -> ExportSheet {
        let mut columns: Vec<String> = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            if columns.contains(col) {
                continue;
            }
            if records.iter().any(|r| r.get(col).is_some()) {
                columns.push(col.clone());
            }
        }

        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        ExportSheet { name: self.name.clone(), columns, rows }
    }

    /// Export a whole table, optionally restricted to `columns`.
    ///
    /// The table's own header decides which columns exist, so an empty
    /// table still exports its header row.
    pub fn from_table(table: &Table, columns: Option<&[String]>) -> ExportSheet {
        let wanted: Vec<usize> = match columns {
            Some(cols) => {
                let mut picked: Vec<usize> = Vec::new();
                for idx in cols.iter().filter_map(|c| table.column_index(c)) {
                    if !picked.contains(&idx) {
                        picked.push(idx);
                    }
                }
                picked
            }
            None => (0..table.columns().len()).collect(),
        };

        ExportSheet {
            name: table.name().to_string(),
            columns: wanted.iter().map(|&i| table.columns()[i].clone()).collect(),
            rows: table
                .rows()
                .iter()
                .map(|row| wanted.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

/// Output format, picked from the destination's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        match crate::extension_of(path).as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "xlsx" => Ok(Self::Xlsx),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "Cannot export to '.{other}': expected .csv, .tsv, .xlsx or .json"
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Tsv => write!(f, "tsv"),
            Self::Xlsx => write!(f, "xlsx"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Write `sheet` to `path` in the format its extension names.
pub fn write(sheet: &ExportSheet, path: &Path) -> Result<ExportFormat, String> {
    let format = ExportFormat::from_path(path)?;
    match format {
        ExportFormat::Csv => crate::csv::export(sheet, path)?,
        ExportFormat::Tsv => crate::csv::export_tsv(sheet, path)?,
        ExportFormat::Xlsx => crate::xlsx::export(sheet, path)?,
        ExportFormat::Json => crate::json::export(sheet, path)?,
    }
    Ok(format)
}
