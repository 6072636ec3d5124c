//! Table Server Protocol: JSONL wire format
//!
//! One JSON object per line in each direction over TCP. Every request
//! carries a client-chosen `id` that the matching response echoes back.
//!
//! # Usage
//!
//! ```ignore
//! use sheetjoin_protocol::{ClientMessage, PingMessage, ServerMessage};
//!
//! let msg = ClientMessage::Ping(PingMessage { id: "1".into() });
//! let line = serde_json::to_string(&msg)?;
//!
//! let response: ServerMessage = serde_json::from_str(&reply)?;
//! ```

use serde::{Deserialize, Serialize};

use sheetjoin_engine::{ConflictSet, ErrorKind, MatchRequest, MatchSpec, Record, SelectionMap, TableInfo};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Client → Server Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ListTables(ListTablesMessage),
    GetTable(GetTableMessage),
    Search(SearchMessage),
    Match(MatchMessage),
    MultiMatch(MultiMatchMessage),
    DeleteTable(DeleteTableMessage),
    LoadFile(LoadFileMessage),
    Export(ExportMessage),
    Ping(PingMessage),
}

impl ClientMessage {
    pub fn id(&self) -> &str {
        match self {
            Self::ListTables(m) => &m.id,
            Self::GetTable(m) => &m.id,
            Self::Search(m) => &m.id,
            Self::Match(m) => &m.id,
            Self::MultiMatch(m) => &m.id,
            Self::DeleteTable(m) => &m.id,
            Self::LoadFile(m) => &m.id,
            Self::Export(m) => &m.id,
            Self::Ping(m) => &m.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTablesMessage {
    pub id: String,
}

/// One page of a table. Pages are 1-based; the server clamps `page_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetTableMessage {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMessage {
    pub id: String,
    pub table: String,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Single-target match. Resend with `selections` after a `need_selection`
/// response; the server keeps no state between the two calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMessage {
    pub id: String,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<SelectionMap>,
    /// Register the joined result under this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
}

impl MatchMessage {
    pub fn request(&self) -> MatchRequest {
        MatchRequest {
            source_table: self.source_table.clone(),
            source_column: self.source_column.clone(),
            target_table: self.target_table.clone(),
            target_columns: self.target_columns.clone(),
            selections: self.selections.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMatchMessage {
    pub id: String,
    pub source_table: String,
    pub source_column: String,
    pub targets: Vec<MatchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTableMessage {
    pub id: String,
    pub name: String,
}

/// Import a file that is readable by the server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFileMessage {
    pub id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Write a registered table to a server-side path (.csv, .tsv, .xlsx, .json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMessage {
    pub id: String,
    pub table: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingMessage {
    pub id: String,
}

// =============================================================================
// Server → Client Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Tables(TablesMessage),
    TablePage(TablePageMessage),
    SearchResult(SearchResultMessage),
    MatchResult(MatchResultMessage),
    Deleted(DeletedMessage),
    Loaded(LoadedMessage),
    Exported(ExportedMessage),
    Pong(PongMessage),
    Error(ErrorMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablesMessage {
    pub id: String,
    pub protocol_version: u32,
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePageMessage {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub data: Vec<Record>,
    pub page: usize,
    pub page_size: usize,
    pub pages: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultMessage {
    pub id: String,
    pub table: String,
    pub columns: Vec<String>,
    pub data: Vec<Record>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Success,
    NeedSelection,
}

/// Outcome of `match` or `multi_match`.
///
/// With `need_selection`, `multi_value_keys` maps each conflicting key to
/// its options, keys in a stable order, and the table fields are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultMessage {
    pub id: String,
    pub status: MatchStatus,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "sheetjoin_engine::conflict::as_key_map"
    )]
    pub multi_value_keys: Vec<ConflictSet>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedMessage {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedMessage {
    pub id: String,
    pub table: TableInfo,
    /// True when a table of the same name was replaced.
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub id: String,
    pub path: String,
    pub format: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMessage {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub id: String,
    pub kind: ErrorCode,
    pub message: String,
}

/// Error categories on the wire: the engine's kinds plus transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidColumn,
    JoinFailure,
    InvalidInput,
    MalformedMessage,
    MessageTooLarge,
    Io,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::InvalidColumn => Self::InvalidColumn,
            ErrorKind::JoinFailure => Self::JoinFailure,
            ErrorKind::InvalidInput => Self::InvalidInput,
        }
    }
}

impl ErrorMessage {
    pub fn new(id: impl Into<String>, kind: ErrorCode, message: impl Into<String>) -> Self {
        Self { id: id.into(), kind, message: message.into() }
    }
}
