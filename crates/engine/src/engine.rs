use crate::error::MatchError;
use crate::matcher::match_tables;
use crate::model::{MatchOutcome, MatchRequest, MultiMatchRequest};
use crate::multi::multi_match;
use crate::registry::TableRegistry;
use crate::search::search;
use crate::table::{Record, Table};

/// Request-level entry points over a shared registry.
///
/// Tables are looked up per call and held as `Arc` snapshots for the
/// duration of the operation; nothing here mutates the registry.
#[derive(Clone, Copy)]
pub struct MatchEngine<'a> {
    registry: &'a TableRegistry,
}

impl<'a> MatchEngine<'a> {
    pub fn new(registry: &'a TableRegistry) -> Self {
        Self { registry }
    }

    /// Single-target match. Conflicts without selections yield
    /// `MatchOutcome::NeedsSelection`.
    pub fn run(&self, request: &MatchRequest) -> Result<MatchOutcome, MatchError> {
        let source = self.registry.get(&request.source_table)?;
        let target = self.registry.get(&request.target_table)?;
        match_tables(
            &source,
            &request.source_column,
            &target,
            &request.target_columns,
            request.selections.as_ref(),
        )
    }

    pub fn run_multi(&self, request: &MultiMatchRequest) -> Result<Table, MatchError> {
        multi_match(self.registry, request)
    }

    pub fn search(&self, table: &str, term: &str, column: Option<&str>) -> Result<Vec<Record>, MatchError> {
        let table = self.registry.get(table)?;
        search(&table, term, column)
    }
}
