use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse failure category, stable across the wire and the CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidColumn,
    JoinFailure,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidColumn => write!(f, "invalid_column"),
            Self::JoinFailure => write!(f, "join_failure"),
            Self::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// No table with this name is loaded.
    NotFound { table: String },
    /// One or more requested columns are absent. Carries the complete missing set.
    InvalidColumn { table: String, columns: Vec<String> },
    /// Unexpected failure while joining (bad selection index, empty target, ...).
    JoinFailure { reason: String },
    /// A table could not be built from the supplied rows.
    InvalidTable { table: String, reason: String },
    /// TOML parse / deserialization error in a match plan.
    PlanParse(String),
    /// Match plan is structurally invalid (no targets, blank names, ...).
    PlanValidation(String),
}

impl MatchError {
    pub fn not_found(table: &str) -> Self {
        Self::NotFound { table: table.to_string() }
    }

    pub fn invalid_columns(table: &str, columns: Vec<String>) -> Self {
        Self::InvalidColumn { table: table.to_string(), columns }
    }

    pub fn join_failure(reason: impl Into<String>) -> Self {
        Self::JoinFailure { reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidColumn { .. } => ErrorKind::InvalidColumn,
            Self::JoinFailure { .. } => ErrorKind::JoinFailure,
            Self::InvalidTable { .. } | Self::PlanParse(_) | Self::PlanValidation(_) => {
                ErrorKind::InvalidInput
            }
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { table } => write!(f, "table '{table}' does not exist"),
            Self::InvalidColumn { table, columns } => {
                let quoted: Vec<String> = columns.iter().map(|c| format!("'{c}'")).collect();
                if columns.len() == 1 {
                    write!(f, "table '{table}': column {} does not exist", quoted[0])
                } else {
                    write!(f, "table '{table}': columns [{}] do not exist", quoted.join(", "))
                }
            }
            Self::JoinFailure { reason } => write!(f, "match failed: {reason}"),
            Self::InvalidTable { table, reason } => write!(f, "table '{table}': {reason}"),
            Self::PlanParse(msg) => write!(f, "match plan parse error: {msg}"),
            Self::PlanValidation(msg) => write!(f, "match plan validation error: {msg}"),
        }
    }
}

impl std::error::Error for MatchError {}
