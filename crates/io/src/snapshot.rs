// Registry snapshot using SQLite
//
// The whole table set is rewritten on every save: a fresh database is built
// next to the target and renamed over it, so readers never see a half
// written file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection};

use sheetjoin_engine::{Cell, Table};

use crate::SNAPSHOT_FORMAT_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tables (
    name TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    row_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS columns (
    table_name TEXT NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (table_name, position)
);

CREATE TABLE IF NOT EXISTS cells (
    table_name TEXT NOT NULL,
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    value_type INTEGER NOT NULL,  -- 1=number, 2=text (empty cells are not stored)
    value_num REAL,
    value_text TEXT,
    PRIMARY KEY (table_name, row, col)
);
"#;

// Value type constants
const TYPE_NUMBER: i32 = 1;
const TYPE_TEXT: i32 = 2;

pub fn save(tables: &[Arc<Table>], path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }

    let tmp = temp_path(path);
    if tmp.exists() {
        std::fs::remove_file(&tmp).map_err(|e| e.to_string())?;
    }

    write_all(tables, &tmp).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })?;

    std::fs::rename(&tmp, path)
        .map_err(|e| format!("Failed to replace snapshot '{}': {}", path.display(), e))
}

fn write_all(tables: &[Arc<Table>], path: &Path) -> Result<(), String> {
    let conn = Connection::open(path).map_err(|e| e.to_string())?;
    conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;

    conn.execute("BEGIN TRANSACTION", []).map_err(|e| e.to_string())?;

    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)",
        params!["format_version", SNAPSHOT_FORMAT_VERSION.to_string()],
    )
    .map_err(|e| e.to_string())?;

    {
        let mut table_stmt = conn
            .prepare("INSERT INTO tables (name, position, row_count) VALUES (?1, ?2, ?3)")
            .map_err(|e| e.to_string())?;
        let mut column_stmt = conn
            .prepare("INSERT INTO columns (table_name, position, name) VALUES (?1, ?2, ?3)")
            .map_err(|e| e.to_string())?;
        let mut cell_stmt = conn
            .prepare(
                "INSERT INTO cells (table_name, row, col, value_type, value_num, value_text) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| e.to_string())?;

        for (position, table) in tables.iter().enumerate() {
            let name = table.name();
            table_stmt
                .execute(params![name, position as i64, table.row_count() as i64])
                .map_err(|e| e.to_string())?;

            for (col, column) in table.columns().iter().enumerate() {
                column_stmt
                    .execute(params![name, col as i64, column])
                    .map_err(|e| e.to_string())?;
            }

            for (row, cells) in table.rows().iter().enumerate() {
                for (col, cell) in cells.iter().enumerate() {
                    let (value_type, value_num, value_text): (i32, Option<f64>, Option<&str>) =
                        match cell {
                            Cell::Empty => continue,
                            Cell::Text(s) if s.is_empty() => continue,
                            Cell::Number(n) => (TYPE_NUMBER, Some(*n), None),
                            Cell::Text(s) => (TYPE_TEXT, None, Some(s.as_str())),
                        };
                    cell_stmt
                        .execute(params![name, row as i64, col as i64, value_type, value_num, value_text])
                        .map_err(|e| e.to_string())?;
                }
            }
        }
    }

    conn.execute("COMMIT", []).map_err(|e| e.to_string())?;
    Ok(())
}

/// Load every table from a snapshot. A missing file is an empty registry.
pub fn load(path: &Path) -> Result<Vec<Table>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let conn = Connection::open(path).map_err(|e| e.to_string())?;

    let version: u32 = conn
        .query_row("SELECT value FROM meta WHERE key = 'format_version'", [], |row| {
            let s: String = row.get(0)?;
            Ok(s.parse().unwrap_or(0))
        })
        .map_err(|e| format!("Not a table snapshot ({}): {}", path.display(), e))?;
    if version == 0 || version > SNAPSHOT_FORMAT_VERSION {
        return Err(format!(
            "Unsupported snapshot format version {} (this build reads up to {})",
            version, SNAPSHOT_FORMAT_VERSION
        ));
    }

    let headers: Vec<(String, usize)> = {
        let mut stmt = conn
            .prepare("SELECT name, row_count FROM tables ORDER BY position")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((name, count.max(0) as usize))
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<_, _>>().map_err(|e| e.to_string())?
    };

    let mut column_stmt = conn
        .prepare("SELECT name FROM columns WHERE table_name = ?1 ORDER BY position")
        .map_err(|e| e.to_string())?;
    let mut cell_stmt = conn
        .prepare("SELECT row, col, value_type, value_num, value_text FROM cells WHERE table_name = ?1")
        .map_err(|e| e.to_string())?;

    let mut tables = Vec::with_capacity(headers.len());
    for (name, row_count) in headers {
        let columns: Vec<String> = column_stmt
            .query_map(params![name], |row| row.get(0))
            .map_err(|e| e.to_string())?
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?;

        let mut rows = vec![vec![Cell::Empty; columns.len()]; row_count];
        let cells = cell_stmt
            .query_map(params![name], |row| {
                let r: i64 = row.get(0)?;
                let c: i64 = row.get(1)?;
                let value_type: i32 = row.get(2)?;
                let value_num: Option<f64> = row.get(3)?;
                let value_text: Option<String> = row.get(4)?;
                Ok((r, c, value_type, value_num, value_text))
            })
            .map_err(|e| e.to_string())?;

        for cell in cells {
            let (r, c, value_type, value_num, value_text) = cell.map_err(|e| e.to_string())?;
            let slot = match (usize::try_from(r), usize::try_from(c)) {
                (Ok(ri), Ok(ci)) => rows.get_mut(ri).and_then(|row| row.get_mut(ci)),
                _ => None,
            };
            let slot = slot.ok_or_else(|| format!("Snapshot table '{}' has a cell outside its bounds ({}, {})", name, r, c))?;
            *slot = match (value_type, value_num, value_text) {
                (TYPE_NUMBER, Some(n), _) => Cell::Number(n),
                (TYPE_TEXT, _, Some(s)) => Cell::text(s),
                _ => Cell::Empty,
            };
        }

        tables.push(Table::new(name, columns, rows).map_err(|e| e.to_string())?);
    }

    Ok(tables)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
