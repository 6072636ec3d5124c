//! Plain-text table output for terminal commands.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use sheetjoin_engine::Record;

/// Widest a column is allowed to render before values are truncated.
const MAX_COLUMN_WIDTH: usize = 40;

/// Display width of a string, accounting for CJK double-width, emoji, etc.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cut `s` down to `width` display columns, marking the cut with "..".
/// Below three columns there is no room for the marker, so the first
/// character that fits is kept on its own.
pub(crate) fn truncate_display(s: &str, width: usize) -> String {
    if width < 3 {
        return s
            .chars()
            .find(|ch| ch.width().unwrap_or(0) <= width)
            .map(String::from)
            .unwrap_or_default();
    }
    if display_width(s) <= width {
        return s.to_string();
    }

    let room = width - 2;
    let mut kept = String::new();
    let mut used = 0;
    for ch in s.chars() {
        used += ch.width().unwrap_or(0);
        if used > room {
            break;
        }
        kept.push(ch);
    }
    kept.push_str("..");
    kept
}

/// Pad or truncate a string to exactly `width` display columns.
pub(crate) fn pad_right(s: &str, width: usize) -> String {
    let sw = display_width(s);
    if sw > width {
        truncate_display(s, width)
    } else {
        format!("{}{}", s, " ".repeat(width - sw))
    }
}

/// Render records as an aligned text table: header, rule, one line per row.
/// Cells missing from a record render blank.
pub(crate) fn format_records(columns: &[String], records: &[Record]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| r.get(c).map(|cell| cell.display()).unwrap_or_default())
                .collect()
        })
        .collect();
    format_rows(columns, &rows)
}

pub(crate) fn format_rows(columns: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|v| display_width(v))
                .chain(std::iter::once(display_width(name)))
                .max()
                .unwrap_or(0)
                .min(MAX_COLUMN_WIDTH)
        })
        .collect();

    let mut out = String::new();
    out.push_str(&format_line(columns.iter().map(String::as_str), &widths));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w.max(1))).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&format_line(row.iter().map(String::as_str), &widths));
        out.push('\n');
    }
    out
}

fn format_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let cells: Vec<String> = values.zip(widths).map(|(v, &w)| pad_right(v, w)).collect();
    cells.join("  ").trim_end().to_string()
}
