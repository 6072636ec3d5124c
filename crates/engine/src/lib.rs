//! `sheetjoin-engine`: tables, search and key-based matching.
//!
//! Pure engine crate: works on tables already held in memory. File formats,
//! persistence and transport live in the io and cli crates.

pub mod cell;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod multi;
pub mod plan;
pub mod registry;
pub mod search;
pub mod table;

pub use cell::Cell;
pub use conflict::{ConflictSet, MATCHED_SUFFIX};
pub use engine::MatchEngine;
pub use error::{ErrorKind, MatchError};
pub use matcher::match_tables;
pub use model::{
    Condition, MatchOutcome, MatchRequest, MatchSpec, MultiMatchRequest, PendingSelection,
    SelectionMap,
};
pub use multi::multi_match;
pub use registry::{TableInfo, TableRegistry};
pub use search::search;
pub use table::{Record, Table};
