// File I/O: table import, export rendering, registry snapshots

pub mod csv;
pub mod export;
pub mod json;
pub mod snapshot;
pub mod xlsx;

use std::path::Path;

use sheetjoin_engine::Table;

/// Snapshot format version.
/// Increment when the schema changes in a way older builds can't read.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Extensions accepted by [`import_table`].
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];
pub const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Import a table from a spreadsheet or delimited-text file.
///
/// The table is named after the file stem unless `name` is given.
pub fn import_table(path: &Path, name: Option<&str>) -> Result<Table, String> {
    let name = match name {
        Some(n) => n.to_string(),
        None => table_name_for(path)?,
    };
    let ext = extension_of(path);

    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        xlsx::import_named(path, &name)
    } else if ext == "tsv" {
        csv::import_tsv_named(path, &name)
    } else if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        csv::import_named(path, &name)
    } else {
        Err(format!(
            "Unsupported file type '{}': expected one of {}",
            path.display(),
            SPREADSHEET_EXTENSIONS
                .iter()
                .chain(DELIMITED_EXTENSIONS)
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

/// Table name derived from a file path: the file name without its extension.
pub fn table_name_for(path: &Path) -> Result<String, String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("Cannot derive a table name from '{}'", path.display()))
}

pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Turn a raw header row into unique column names.
///
/// Blank headers become `Unnamed: <index>`; repeated names get `.1`, `.2`, ...
/// in order of appearance (`id`, `id.1`).
pub(crate) fn header_names(raw: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, header) in raw.iter().enumerate() {
        let base = header.trim();
        let base = if base.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            base.to_string()
        };

        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        names.push(name);
    }
    names
}
