// JSON export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::export::ExportSheet;

/// Export as a JSON array of objects, keys in column order.
pub fn export(sheet: &ExportSheet, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &sheet.records()).map_err(|e| e.to_string())?;
    Ok(())
}

pub fn to_string(sheet: &ExportSheet) -> Result<String, String> {
    serde_json::to_string(&sheet.records()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use sheetjoin_engine::{Cell, Record};

    use crate::export::ExportBuilder;

    #[test]
    fn test_json_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.json");

        let records = vec![
            Record::new().with("Name", "Alice").with("Value", 42.0),
            Record::new().with("Name", "Bob").with("Value", Cell::Empty),
        ];
        let sheet = ExportBuilder::new(vec!["Value".into(), "Name".into()]).build(&records);
        export(&sheet, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                { "Value": 42, "Name": "Alice" },
                { "Value": "", "Name": "Bob" }
            ])
        );
        // Key order follows the requested columns
        assert!(to_string(&sheet).unwrap().starts_with(r#"[{"Value":42,"Name":"Alice"}"#));
    }
}
