// CSV/TSV import/export

use std::path::Path;

use sheetjoin_engine::{Cell, Table};

use crate::export::ExportSheet;

pub fn import(path: &Path) -> Result<Table, String> {
    import_named(path, &crate::table_name_for(path)?)
}

pub fn import_named(path: &Path, name: &str) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_string(&content, delimiter, name)
}

pub fn import_tsv_named(path: &Path, name: &str) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    import_from_string(&content, b'\t', name)
}

const DELIMITER_CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];

/// Guess the field delimiter from the first lines of `content`.
///
/// A candidate must split the header into more than one field. Among those,
/// the one whose sample records most often agree with the header's field
/// count (weighted by that count) wins; ties go to the earlier candidate.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample = content.lines().take(10).collect::<Vec<_>>().join("\n");

    DELIMITER_CANDIDATES
        .iter()
        .filter_map(|&delim| {
            let widths = field_counts(&sample, delim);
            let header = *widths.first()?;
            if header <= 1 {
                return None;
            }
            let agreeing = widths.iter().filter(|&&w| w == header).count();
            Some((agreeing * header, delim))
        })
        .fold((0, b','), |best, candidate| if candidate.0 > best.0 { candidate } else { best })
        .1
}

fn field_counts(sample: &str, delimiter: u8) -> Vec<usize> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(sample.as_bytes())
        .records()
        .map(|record| record.map(|r| r.len()).unwrap_or(1))
        .collect()
}

/// Read a text file as UTF-8, dropping a leading BOM. Anything that is not
/// valid UTF-8 (Excel "CSV" exports, mostly) is decoded as Windows-1252.
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let raw = std::fs::read(path).map_err(|e| format!("Cannot open '{}': {}", path.display(), e))?;
    let bytes = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => Ok(encoding_rs::WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0
            .into_owned()),
    }
}

/// Parse delimited text: the first record is the header row.
pub fn import_from_string(content: &str, delimiter: u8, name: &str) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(result) => result.map_err(|e| e.to_string())?,
        None => return Err(format!("'{name}' is empty: a header row is required")),
    };
    let raw: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    let columns = crate::header_names(&raw);

    let mut rows = Vec::new();
    for result in records {
        let record = result.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(Cell::from_input).collect());
    }

    Table::new(name, columns, rows).map_err(|e| e.to_string())
}

pub fn export(sheet: &ExportSheet, path: &Path) -> Result<(), String> {
    export_with_delimiter(sheet, path, b',')
}

pub fn export_tsv(sheet: &ExportSheet, path: &Path) -> Result<(), String> {
    export_with_delimiter(sheet, path, b'\t')
}

fn export_with_delimiter(sheet: &ExportSheet, path: &Path, delimiter: u8) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    writer.write_record(&sheet.columns).map_err(|e| e.to_string())?;
    for row in &sheet.rows {
        let record: Vec<String> = row.iter().map(Cell::display).collect();
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
