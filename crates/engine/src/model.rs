use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictSet;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Key value -> chosen option index, sent back after `NeedsSelection`.
pub type SelectionMap = BTreeMap<String, usize>;

/// Single-target lookup. The target is always keyed on its first column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<SelectionMap>,
}

/// Extra equality predicate ANDed with the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub source_column: String,
    pub target_column: String,
}

/// One step of a chained join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSpec {
    /// Column of the running result to join on. Defaults to the request's
    /// `source_column`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    pub target_table: String,
    pub target_match_column: String,
    pub target_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Chained join over several targets, applied strictly in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMatchRequest {
    #[serde(default)]
    pub source_table: String,
    #[serde(default)]
    pub source_column: String,
    pub targets: Vec<MatchSpec>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Conflicts the caller must resolve before a single-target match can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSelection {
    pub target_table: String,
    pub key_column: String,
    pub columns: Vec<String>,
    /// Serialized as `{key: [option, ...]}` in detection order.
    #[serde(with = "crate::conflict::as_key_map")]
    pub conflicts: Vec<ConflictSet>,
}

impl PendingSelection {
    /// Selection map choosing option 0 for every conflict.
    pub fn first_options(&self) -> SelectionMap {
        self.conflicts.iter().map(|c| (c.key.clone(), 0)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Success(Table),
    NeedsSelection(PendingSelection),
}

impl MatchOutcome {
    pub fn into_table(self) -> Option<Table> {
        match self {
            MatchOutcome::Success(t) => Some(t),
            MatchOutcome::NeedsSelection(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MatchOutcome::Success(_))
    }
}
