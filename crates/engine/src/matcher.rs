use std::collections::HashMap;

use crate::cell::{normalize_key, Cell};
use crate::conflict::{detect_conflicts, unique_column_name, KeyGroups, MATCHED_SUFFIX};
use crate::error::MatchError;
use crate::model::{MatchOutcome, PendingSelection, SelectionMap};
use crate::table::Table;

/// Left-join `target` onto `source`, keyed on the target's first column.
///
/// Keys whose target rows disagree on `target_columns` are conflicts. With
/// no `selections` they are returned as `NeedsSelection` and nothing is
/// joined. With selections, the chosen option wins; unselected conflicting
/// keys fall back to their first row. The result always has exactly one
/// row per source row.
pub fn match_tables(
    source: &Table,
    source_column: &str,
    target: &Table,
    target_columns: &[String],
    selections: Option<&SelectionMap>,
) -> Result<MatchOutcome, MatchError> {
    let source_idx = source.require_column(source_column)?;
    let value_cols = target.require_columns(target_columns)?;

    let Some(key_name) = target.columns().first().cloned() else {
        return Err(MatchError::join_failure(format!(
            "target table '{}' has no columns to match on",
            target.name()
        )));
    };
    let key_idx = 0;

    let groups = KeyGroups::build(target, &[key_idx]);
    let conflicts = detect_conflicts(target, &groups, key_idx, &value_cols);

    log::debug!(
        "match '{}'.'{}' -> '{}'.'{}': {} key(s), {} conflict(s)",
        source.name(),
        source_column,
        target.name(),
        key_name,
        groups.len(),
        conflicts.len()
    );

    let Some(selections) = selections else {
        if !conflicts.is_empty() {
            return Ok(MatchOutcome::NeedsSelection(PendingSelection {
                target_table: target.name().to_string(),
                key_column: key_name,
                columns: target_columns.to_vec(),
                conflicts,
            }));
        }
        return Ok(MatchOutcome::Success(join(source, source_idx, target, &groups, &value_cols, &HashMap::new())));
    };

    // Selection keys are matched the same way join keys are.
    let chosen: HashMap<String, usize> = selections
        .iter()
        .map(|(k, v)| (normalize_key(k), *v))
        .collect();

    let mut overrides: HashMap<Vec<String>, Vec<Cell>> = HashMap::new();
    for conflict in &conflicts {
        let Some(&pick) = conflict.normalized.first().and_then(|k| chosen.get(k)) else {
            continue;
        };
        let option = conflict.options.get(pick).ok_or_else(|| {
            MatchError::join_failure(format!(
                "selection {pick} for key '{}' is out of range ({} option(s))",
                conflict.key,
                conflict.options.len()
            ))
        })?;
        let values = option.iter().map(|(_, cell)| cell.clone()).collect();
        overrides.insert(conflict.normalized.clone(), values);
    }

    Ok(MatchOutcome::Success(join(source, source_idx, target, &groups, &value_cols, &overrides)))
}

/// Left outer join with at most one target row per key.
fn join(
    source: &Table,
    source_idx: usize,
    target: &Table,
    groups: &KeyGroups,
    value_cols: &[usize],
    overrides: &HashMap<Vec<String>, Vec<Cell>>,
) -> Table {
    let key_idx = 0;
    let source_column = &source.columns()[source_idx];

    // Incoming columns: the target key (unless it coalesces with the source
    // join column) followed by the projected columns, key not repeated.
    let mut incoming: Vec<usize> = Vec::new();
    if target.columns()[key_idx] != *source_column {
        incoming.push(key_idx);
    }
    let mut projected_slots = Vec::with_capacity(value_cols.len());
    for (slot, &col) in value_cols.iter().enumerate() {
        if col == key_idx || incoming.contains(&col) {
            continue;
        }
        incoming.push(col);
        projected_slots.push((col, slot));
    }

    let mut columns = source.columns().to_vec();
    for &col in &incoming {
        let name = unique_column_name(&columns, &target.columns()[col], MATCHED_SUFFIX);
        columns.push(name);
    }

    // Deduplicated lookup: normalized key -> representative target cells.
    let mut lookup: HashMap<&[String], Vec<Cell>> = HashMap::with_capacity(groups.len());
    for (key, rows) in groups.iter() {
        let first = &target.rows()[rows[0]];
        let mut cells: Vec<Cell> = incoming.iter().map(|&c| first[c].clone()).collect();
        if let Some(values) = overrides.get(key) {
            for (offset, &col) in incoming.iter().enumerate() {
                if let Some(&(_, slot)) = projected_slots.iter().find(|(c, _)| *c == col) {
                    cells[offset] = values[slot].clone();
                }
            }
        }
        lookup.insert(key, cells);
    }

    let mut rows = Vec::with_capacity(source.row_count());
    let mut matched = 0usize;
    for src in source.rows() {
        let mut row = src.clone();
        let key = src[source_idx].join_key();
        let found = if key.is_empty() { None } else { lookup.get([key].as_slice()) };
        match found {
            Some(cells) => {
                matched += 1;
                row.extend(cells.iter().cloned());
            }
            None => row.extend(std::iter::repeat(Cell::Empty).take(incoming.len())),
        }
        rows.push(row);
    }

    log::debug!(
        "match '{}' -> '{}': {} of {} source row(s) matched",
        source.name(),
        target.name(),
        matched,
        source.row_count()
    );

    Table::from_parts(format!("{} → {}", source.name(), target.name()), columns, rows)
}
