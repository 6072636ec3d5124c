// Excel file import (xlsx, xls, xlsb, ods) and export (xlsx only)
//
// Import reads the first worksheet: header row first, records below.
// Export writes one worksheet with a bold header row.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use sheetjoin_engine::{Cell, Table};

use crate::export::ExportSheet;

/// Excel's limit on worksheet name length
const MAX_SHEET_NAME: usize = 31;

pub fn import(path: &Path) -> Result<Table, String> {
    import_named(path, &crate::table_name_for(path)?)
}

/// Import the first worksheet of an Excel/ODS file as a table called `name`.
pub fn import_named(path: &Path, name: &str) -> Result<Table, String> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "Excel file contains no sheets".to_string())?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(cells) => cells.iter().map(|c| convert(c).display()).collect::<Vec<_>>(),
        None => return Table::new(name, Vec::new(), Vec::new()).map_err(|e| e.to_string()),
    };
    let columns = crate::header_names(&header);

    let mut records = Vec::new();
    for cells in rows {
        let row: Vec<Cell> = cells.iter().map(convert).collect();
        // Blank lines inside the used range are not records
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        records.push(row);
    }

    Table::new(name, columns, records).map_err(|e| e.to_string())
}

fn convert(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        // TRUE/FALSE text, as Excel displays them
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
        // Serial date number (1900 system)
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
    }
}

pub fn export(sheet: &ExportSheet, path: &Path) -> Result<(), String> {
    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook
        .add_worksheet()
        .set_name(sheet_name(&sheet.name))
        .map_err(|e| format!("Failed to create sheet '{}': {}", sheet.name, e))?;

    for (col, name) in sheet.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &header_format)
            .map_err(|e| format!("Failed to write header '{}': {}", name, e))?;
    }

    for (idx, row) in sheet.rows.iter().enumerate() {
        let row32 = (idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col16 = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    worksheet
                        .write_number(row32, col16, *n)
                        .map_err(|e| format!("Failed to write cell: {}", e))?;
                }
                Cell::Text(s) => {
                    worksheet
                        .write_string(row32, col16, s)
                        .map_err(|e| format!("Failed to write cell: {}", e))?;
                }
            }
        }
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;
    Ok(())
}

/// Worksheet-safe version of a table name.
fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    if cleaned.is_empty() {
        return "Sheet1".to_string();
    }
    cleaned.chars().take(MAX_SHEET_NAME).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportBuilder;

    #[test]
    fn test_sheet_name_is_sanitized() {
        assert_eq!(sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sheet_name(""), "Sheet1");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sheet_name("orders → customers"), "orders → customers");
    }

    #[test]
    fn test_export_then_import() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("Customers.xlsx");

        let table = Table::new(
            "source",
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                vec![Cell::from("007"), Cell::from("Ann"), Cell::Number(1.5)],
                vec![Cell::from("8"), Cell::Empty, Cell::Number(2.0)],
            ],
        )
        .unwrap();
        export(&ExportBuilder::from_table(&table, None), &path).unwrap();

        let back = import(&path).unwrap();
        assert_eq!(back.name(), "Customers");
        assert_eq!(back.columns(), table.columns());
        assert_eq!(back.rows()[0][0], Cell::from("007"));
        assert_eq!(back.rows()[0][2], Cell::Number(1.5));
        assert_eq!(back.rows()[1][1], Cell::Empty);
    }

    #[test]
    fn test_import_headers_and_booleans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("raw.xlsx");

        let mut workbook = XlsxWorkbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "id").unwrap();
        ws.write_string(0, 2, "id").unwrap();
        ws.write_number(1, 0, 1.0).unwrap();
        ws.write_boolean(1, 1, true).unwrap();
        ws.write_string(1, 2, "x").unwrap();
        ws.write_number(3, 0, 2.0).unwrap();
        workbook.save(&path).unwrap();

        let table = import(&path).unwrap();
        assert_eq!(
            table.columns(),
            &["id", "Unnamed: 1", "id.1"].map(String::from)[..]
        );
        // The blank row 3 is skipped
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0][1], Cell::from("TRUE"));
        assert_eq!(table.rows()[1][0], Cell::Number(2.0));
    }

    #[test]
    fn test_import_missing_file() {
        let err = import(Path::new("/nonexistent/book.xlsx")).unwrap_err();
        assert!(err.starts_with("Failed to open Excel file"), "{err}");
    }
}
