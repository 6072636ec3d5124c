//! CLI Exit Code Registry
//!
//! Every exit code `sjoin` can return is defined here. Scripts branch on
//! these values, so existing codes never change meaning.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad arguments, unreadable match plan)   |
//! | 3    | Table not found                                      |
//! | 4    | One or more columns do not exist                     |
//! | 5    | Join failure (bad selection index, empty target)     |
//! | 6    | Match needs a selection for multi-value keys         |
//! | 7    | I/O error (import, export, snapshot, network)        |

use sheetjoin_engine::{ErrorKind, MatchError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed `--select`, invalid match plan.
pub const EXIT_USAGE: u8 = 2;

/// A named table is not loaded.
pub const EXIT_NOT_FOUND: u8 = 3;

/// A requested column is missing from a table.
pub const EXIT_INVALID_COLUMN: u8 = 4;

/// The join itself failed.
pub const EXIT_JOIN_FAILURE: u8 = 5;

/// Conflicting target values were found and no selection was supplied.
/// Rerun with `--select KEY=INDEX` or `--first`.
pub const EXIT_NEEDS_SELECTION: u8 = 6;

/// Reading or writing a file (or socket) failed.
pub const EXIT_IO: u8 = 7;

/// Map an engine error to its exit code.
pub fn match_error_exit_code(err: &MatchError) -> u8 {
    match err.kind() {
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        ErrorKind::InvalidColumn => EXIT_INVALID_COLUMN,
        ErrorKind::JoinFailure => EXIT_JOIN_FAILURE,
        ErrorKind::InvalidInput => EXIT_USAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_distinct_codes() {
        assert_eq!(match_error_exit_code(&MatchError::not_found("t")), EXIT_NOT_FOUND);
        assert_eq!(
            match_error_exit_code(&MatchError::invalid_columns("t", vec!["c".into()])),
            EXIT_INVALID_COLUMN
        );
        assert_eq!(match_error_exit_code(&MatchError::join_failure("x")), EXIT_JOIN_FAILURE);
        assert_eq!(match_error_exit_code(&MatchError::PlanParse("x".into())), EXIT_USAGE);
    }

    #[test]
    fn codes_are_unique() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_NOT_FOUND,
            EXIT_INVALID_COLUMN,
            EXIT_JOIN_FAILURE,
            EXIT_NEEDS_SELECTION,
            EXIT_IO,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
