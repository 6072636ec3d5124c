use crate::error::MatchError;
use crate::table::{Record, Table};

/// Rows whose stringified cells contain `term`, case-insensitively.
///
/// With `column`, only that column is tested; otherwise any column may
/// match. Source row order is preserved.
pub fn search(table: &Table, term: &str, column: Option<&str>) -> Result<Vec<Record>, MatchError> {
    let rows = search_rows(table, term, column)?;
    Ok(rows.into_iter().filter_map(|i| table.record(i)).collect())
}

/// Indices of matching rows, in source order.
pub fn search_rows(table: &Table, term: &str, column: Option<&str>) -> Result<Vec<usize>, MatchError> {
    let needle = term.to_lowercase();

    let scoped = match column {
        Some(col) => Some(table.require_column(col)?),
        None => None,
    };

    let hits = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, cells)| match scoped {
            Some(idx) => cells[idx].contains_folded(&needle),
            None => cells.iter().any(|c| c.contains_folded(&needle)),
        })
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    log::debug!(
        "search '{}' in '{}'{}: {} hit(s)",
        term,
        table.name(),
        column.map(|c| format!(" column '{c}'")).unwrap_or_default(),
        hits.len()
    );
    Ok(hits)
}
