use crate::cell::Cell;
use crate::conflict::{row_key, unique_column_name, KeyGroups, MATCHED_SUFFIX};
use crate::error::MatchError;
use crate::model::{MatchSpec, MultiMatchRequest};
use crate::registry::TableRegistry;
use crate::table::Table;

/// Chained left join over every target in `request`, in list order.
///
/// Each step joins against the running result of the previous one, so a
/// later step may key on (or condition against) a column an earlier step
/// introduced. Every matching target row is kept: one-to-many keys fan the
/// running row out. The first failing step aborts the whole chain.
pub fn multi_match(registry: &TableRegistry, request: &MultiMatchRequest) -> Result<Table, MatchError> {
    let source = registry.get(&request.source_table)?;
    source.require_column(&request.source_column)?;

    let mut running = (*source).clone();
    let mut chain = vec![source.name().to_string()];

    for (step, spec) in request.targets.iter().enumerate() {
        let target = registry.get(&spec.target_table)?;
        let before = running.row_count();
        running = join_step(running, &request.source_column, spec, &target)?;
        log::debug!(
            "multi-match step {} '{}': {} -> {} row(s)",
            step + 1,
            target.name(),
            before,
            running.row_count()
        );
        chain.push(target.name().to_string());
    }

    Ok(running.renamed(chain.join(" → ")))
}

/// Apply one `MatchSpec` to the running result.
pub fn join_step(
    running: Table,
    default_source_column: &str,
    spec: &MatchSpec,
    target: &Table,
) -> Result<Table, MatchError> {
    let source_column = spec.source_column.as_deref().unwrap_or(default_source_column);

    // Validate on the deduplicated names so each missing column is reported
    // once, then resolve the full (possibly repeating) key lists.
    let mut left_names = vec![source_column.to_string()];
    left_names.extend(spec.conditions.iter().map(|c| c.source_column.clone()));
    running.require_columns(&dedup(&left_names))?;
    let left_key = running.require_columns(&left_names)?;

    let mut right_names = vec![spec.target_match_column.clone()];
    right_names.extend(spec.conditions.iter().map(|c| c.target_column.clone()));
    let mut all_target = right_names.clone();
    all_target.extend(spec.target_columns.iter().cloned());
    target.require_columns(&dedup(&all_target))?;

    let right_key = target.require_columns(&right_names)?;
    let projected = target.require_columns(&spec.target_columns)?;

    let mut columns = running.columns().to_vec();
    for &col in &projected {
        let wanted = format!("{}({})", target.columns()[col], target.name());
        let name = unique_column_name(&columns, &wanted, MATCHED_SUFFIX);
        columns.push(name);
    }

    let groups = KeyGroups::build(target, &right_key);

    let name = running.name().to_string();
    let mut rows = Vec::with_capacity(running.row_count());
    for row in running.rows() {
        let hits = row_key(row, &left_key).and_then(|k| groups.get(&k));
        match hits {
            Some(target_rows) => {
                for &t in target_rows {
                    let mut out = row.clone();
                    out.extend(projected.iter().map(|&c| target.rows()[t][c].clone()));
                    rows.push(out);
                }
            }
            None => {
                let mut out = row.clone();
                out.extend(std::iter::repeat(Cell::Empty).take(projected.len()));
                rows.push(out);
            }
        }
    }

    Ok(Table::from_parts(name, columns, rows))
}

fn dedup(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for n in names {
        if !out.contains(n) {
            out.push(n.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Condition;

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from(*v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn spec(table: &str, key: &str, cols: &[&str]) -> MatchSpec {
        MatchSpec {
            source_column: None,
            target_table: table.into(),
            target_match_column: key.into(),
            target_columns: cols.iter().map(|c| c.to_string()).collect(),
            conditions: Vec::new(),
        }
    }

    fn registry() -> TableRegistry {
        TableRegistry::from_tables(vec![
            table("orders", &["order", "cust", "region"], &[
                &["o1", "c1", "EU"],
                &["o2", "c2", "US"],
                &["o3", "c9", "EU"],
            ]),
            table("customers", &["id", "name", "region"], &[
                &["c1", "Ann", "EU"],
                &["c1", "Ann (US)", "US"],
                &["c2", "Ben", "US"],
            ]),
            table("reps", &["region", "rep"], &[
                &["EU", "Eve"],
                &["EU", "Eli"],
                &["US", "Sam"],
            ]),
        ])
    }

    #[test]
    fn one_to_many_fans_out() {
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![spec("customers", "id", &["name"])],
        };
        let out = multi_match(&registry(), &req).unwrap();
        assert_eq!(out.columns().last().unwrap(), "name(customers)");
        // o1 -> 2 customers rows, o2 -> 1, o3 unmatched -> 1
        assert_eq!(out.row_count(), 4);
        assert_eq!(out.rows()[3][3], Cell::Empty);
        assert_eq!(out.name(), "orders → customers");
    }

    #[test]
    fn conditions_form_a_composite_key() {
        let mut s = spec("customers", "id", &["name"]);
        s.conditions.push(Condition { source_column: "region".into(), target_column: "region".into() });
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![s],
        };
        let out = multi_match(&registry(), &req).unwrap();
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.rows()[0][3], Cell::from("Ann"));
        assert_eq!(out.rows()[1][3], Cell::from("Ben"));
    }

    #[test]
    fn row_count_is_sum_of_products() {
        let mut reps = spec("reps", "region", &["rep"]);
        reps.source_column = Some("region".into());
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![spec("customers", "id", &["name"]), reps],
        };
        let out = multi_match(&registry(), &req).unwrap();
        // o1: 2 customers x 2 EU reps = 4; o2: 1 x 1 = 1; o3: 1 (unmatched) x 2 = 2
        assert_eq!(out.row_count(), 7);
        assert_eq!(out.columns().len(), 5);
    }

    #[test]
    fn later_target_may_use_earlier_columns_only_in_order() {
        // Step 2 joins reps on the region pulled in from customers.
        let customers = spec("customers", "id", &["region"]);
        let mut reps = spec("reps", "region", &["rep"]);
        reps.source_column = Some("region(customers)".into());

        let ordered = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![customers.clone(), reps.clone()],
        };
        let out = multi_match(&registry(), &ordered).unwrap();
        assert!(out.columns().contains(&"rep(reps)".to_string()));

        let swapped = MultiMatchRequest { targets: vec![reps, customers], ..ordered };
        let err = multi_match(&registry(), &swapped).unwrap_err();
        assert_eq!(
            err,
            MatchError::invalid_columns("orders", vec!["region(customers)".into()])
        );
    }

    #[test]
    fn first_error_aborts_the_chain() {
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![spec("customers", "id", &["name"]), spec("ghost", "id", &["x"])],
        };
        assert_eq!(multi_match(&registry(), &req).unwrap_err(), MatchError::not_found("ghost"));
    }

    #[test]
    fn missing_target_columns_reported_as_a_set() {
        let mut s = spec("customers", "idx", &["name", "age"]);
        s.conditions.push(Condition { source_column: "region".into(), target_column: "zone".into() });
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![s],
        };
        assert_eq!(
            multi_match(&registry(), &req).unwrap_err(),
            MatchError::invalid_columns("customers", vec!["idx".into(), "zone".into(), "age".into()])
        );
    }

    #[test]
    fn target_key_named_like_running_column_is_kept_once() {
        let mut reps = spec("reps", "region", &["rep"]);
        reps.source_column = Some("region".into());
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "region".into(),
            targets: vec![reps],
        };
        let out = multi_match(&registry(), &req).unwrap();
        assert_eq!(out.columns(), &["order", "cust", "region", "rep(reps)"].map(String::from)[..]);
        assert_eq!(out.row_count(), 5);
    }

    #[test]
    fn same_target_twice_gets_unique_names() {
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![spec("customers", "id", &["name"]), spec("customers", "id", &["name"])],
        };
        let out = multi_match(&registry(), &req).unwrap();
        let cols = out.columns();
        assert_eq!(cols[cols.len() - 2], "name(customers)");
        assert_eq!(cols[cols.len() - 1], "name(customers)_matched");
    }

    #[test]
    fn deterministic() {
        let req = MultiMatchRequest {
            source_table: "orders".into(),
            source_column: "cust".into(),
            targets: vec![spec("customers", "id", &["name", "region"])],
        };
        let reg = registry();
        assert_eq!(multi_match(&reg, &req).unwrap(), multi_match(&reg, &req).unwrap());
    }
}
