//! JSONL table server.
//!
//! One request per line, one response per line, one thread per connection.
//! Requests are independent: the two-phase match protocol keeps no state
//! between calls, so a client may resend a `match` with `selections` on any
//! connection.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sheetjoin_config::Settings;
use sheetjoin_engine::{search, MatchEngine, MatchError, MatchOutcome, MultiMatchRequest, Table, TableInfo};
use sheetjoin_io::export::{self, ExportBuilder};
use sheetjoin_protocol::{
    ClientMessage, DeletedMessage, ErrorCode, ErrorMessage, ExportedMessage, LoadedMessage,
    MatchResultMessage, MatchStatus, PongMessage, SearchResultMessage, ServerMessage,
    TablePageMessage, TablesMessage, PROTOCOL_VERSION,
};

use crate::store::Store;

/// Consecutive unparseable lines tolerated before the connection is closed.
const MAX_PARSE_FAILURES: u32 = 3;

pub struct TableServer {
    listener_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    bound_addr: Option<SocketAddr>,
}

impl TableServer {
    pub fn new() -> Self {
        Self {
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
        }
    }

    /// Bind `bind` and start accepting connections on a background thread.
    pub fn start(&mut self, bind: &str, store: Arc<Store>, settings: Arc<Settings>) -> std::io::Result<SocketAddr> {
        if let Some(addr) = self.bound_addr.filter(|_| self.is_running()) {
            return Ok(addr);
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let listener = TcpListener::bind(bind)?;
        let addr = listener.local_addr()?;
        // Non-blocking so the accept loop can observe the shutdown flag
        listener.set_nonblocking(true)?;
        self.bound_addr = Some(addr);

        let shutdown = Arc::clone(&self.shutdown);
        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, store, settings);
        }));

        log::info!("Table server listening on {}", addr);
        Ok(addr)
    }

    /// Block until the listener thread exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
    }

    /// Flag the listener and its connections poll. Setting it (from a
    /// signal handler, say) makes `wait` return once they have all exited.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn stop(&mut self) {
        if self.listener_handle.is_none() {
            return;
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.wait();
        self.bound_addr = None;
        log::info!("Table server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }
}

impl Default for TableServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TableServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener(listener: TcpListener, shutdown: Arc<AtomicBool>, store: Arc<Store>, settings: Arc<Settings>) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("Accepted connection from {}", addr);
                connections.retain(|handle| !handle.is_finished());
                let store = Arc::clone(&store);
                let settings = Arc::clone(&settings);
                let shutdown = Arc::clone(&shutdown);
                connections.push(thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &store, &settings, &shutdown) {
                        log::warn!("Connection error from {}: {}", addr, e);
                    }
                    log::debug!("Connection from {} closed", addr);
                }));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                shutdown.store(true, Ordering::SeqCst);
            }
        }
    }

    // Connections poll the same flag between reads; once they are gone the
    // caller holds the last reference to the store.
    for handle in connections {
        if handle.join().is_err() {
            log::error!("Connection thread panicked");
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    store: &Store,
    settings: &Settings,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    // Short read timeout so the shutdown flag is checked between lines
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    let max_size = settings.max_message_bytes;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut buf: Vec<u8> = Vec::new();
    let mut parse_failures: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Never buffer more than one byte past the cap
        let remaining = (max_size + 1).saturating_sub(buf.len()) as u64;
        let read = (&mut reader).take(remaining).read_until(b'\n', &mut buf);
        match read {
            Ok(0) if buf.is_empty() => return Ok(()), // Connection closed
            Ok(_) => {}
            Err(ref e)
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => return Err(e),
        }

        let content_len = buf.len() - usize::from(buf.ends_with(b"\n"));
        if content_len > max_size {
            send_error(&mut stream, ErrorMessage::new("", ErrorCode::MessageTooLarge, format!(
                "message exceeds {} bytes",
                max_size
            )))?;
            log::warn!("Client sent oversized message (> {} bytes), disconnecting", max_size);
            linger_close(&stream, reader, max_size);
            return Ok(());
        }

        let raw = std::mem::take(&mut buf);
        let text = String::from_utf8_lossy(&raw);
        let line = text.trim();
        if line.is_empty() {
            continue;
        }

        let msg: ClientMessage = match serde_json::from_str(line) {
            Ok(m) => {
                parse_failures = 0;
                m
            }
            Err(e) => {
                parse_failures += 1;
                log::debug!("Malformed message ({}/{}): {}", parse_failures, MAX_PARSE_FAILURES, e);
                send_error(
                    &mut stream,
                    ErrorMessage::new(request_id(line), ErrorCode::MalformedMessage, e.to_string()),
                )?;
                if parse_failures >= MAX_PARSE_FAILURES {
                    log::warn!("Client exceeded parse failure limit, disconnecting");
                    return Ok(());
                }
                continue;
            }
        };

        let response = handle_message(msg, store, settings);
        send_message(&mut stream, &response)?;
    }
}

/// Half-close, then discard what the client already sent. Closing with
/// unread input resets the connection and can drop the error reply.
fn linger_close(stream: &TcpStream, reader: BufReader<TcpStream>, limit: usize) {
    let _ = stream.shutdown(Shutdown::Write);
    let _ = std::io::copy(&mut reader.take(limit as u64), &mut std::io::sink());
}

/// Best-effort `id` of a line that failed to parse as a request.
fn request_id(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default()
}

/// Execute one request against the store.
pub fn handle_message(msg: ClientMessage, store: &Store, settings: &Settings) -> ServerMessage {
    let id = msg.id().to_string();
    let registry = store.registry();
    let engine = MatchEngine::new(registry);

    let result: Result<ServerMessage, ErrorMessage> = match msg {
        ClientMessage::Ping(_) => Ok(ServerMessage::Pong(PongMessage { id: id.clone() })),

        ClientMessage::ListTables(_) => Ok(ServerMessage::Tables(TablesMessage {
            id: id.clone(),
            protocol_version: PROTOCOL_VERSION,
            tables: registry.list(),
        })),

        ClientMessage::GetTable(m) => registry
            .get(&m.name)
            .map(|table| {
                let page_size = settings.clamp_page_size(m.page_size);
                let page = m.page.unwrap_or(1).max(1);
                let total = table.row_count();
                ServerMessage::TablePage(TablePageMessage {
                    id: id.clone(),
                    name: table.name().to_string(),
                    columns: table.columns().to_vec(),
                    data: table.page(page, page_size),
                    page,
                    page_size,
                    pages: total.div_ceil(page_size),
                    total,
                })
            })
            .map_err(|e| engine_error(&id, &e)),

        ClientMessage::Search(m) => registry
            .get(&m.table)
            .and_then(|table| {
                let data = search(&table, &m.term, m.column.as_deref())?;
                Ok(ServerMessage::SearchResult(SearchResultMessage {
                    id: id.clone(),
                    table: table.name().to_string(),
                    columns: table.columns().to_vec(),
                    total: data.len(),
                    data,
                }))
            })
            .map_err(|e| engine_error(&id, &e)),

        ClientMessage::Match(m) => match engine.run(&m.request()) {
            Ok(MatchOutcome::Success(table)) => Ok(match_result(&id, table, m.save_as, store)),
            Ok(MatchOutcome::NeedsSelection(pending)) => {
                log::debug!("match '{}' -> '{}': {} key(s) need a selection", m.source_table, m.target_table, pending.conflicts.len());
                Ok(ServerMessage::MatchResult(MatchResultMessage {
                    id: id.clone(),
                    status: MatchStatus::NeedSelection,
                    multi_value_keys: pending.conflicts,
                    columns: Vec::new(),
                    data: Vec::new(),
                    total: 0,
                    saved_as: None,
                }))
            }
            Err(e) => Err(engine_error(&id, &e)),
        },

        ClientMessage::MultiMatch(m) => {
            let request = MultiMatchRequest {
                source_table: m.source_table,
                source_column: m.source_column,
                targets: m.targets,
            };
            request
                .validate()
                .and_then(|()| engine.run_multi(&request))
                .map(|table| match_result(&id, table, m.save_as, store))
                .map_err(|e| engine_error(&id, &e))
        }

        ClientMessage::DeleteTable(m) => registry
            .delete(&m.name)
            .map(|_| {
                store.persist();
                ServerMessage::Deleted(DeletedMessage { id: id.clone(), name: m.name })
            })
            .map_err(|e| engine_error(&id, &e)),

        ClientMessage::LoadFile(m) => resolve_client_path(&settings.file_root(), &m.path)
            .map_err(|e| ErrorMessage::new(&id, ErrorCode::InvalidInput, e))
            .and_then(|path| {
                sheetjoin_io::import_table(&path, m.name.as_deref())
                    .map_err(|e| ErrorMessage::new(&id, ErrorCode::Io, e))
            })
            .map(|table| {
                let info = TableInfo::of(&table);
                let replaced = registry.put(table).is_some();
                store.persist();
                log::info!("Loaded '{}' ({} rows) from {}", info.name, info.row_count, m.path);
                ServerMessage::Loaded(LoadedMessage { id: id.clone(), table: info, replaced })
            }),

        ClientMessage::Export(m) => match registry.get(&m.table) {
            Ok(table) => resolve_client_path(&settings.file_root(), &m.path)
                .map_err(|e| ErrorMessage::new(&id, ErrorCode::InvalidInput, e))
                .and_then(|path| {
                    let sheet = ExportBuilder::from_table(&table, m.columns.as_deref());
                    export::write(&sheet, &path)
                        .map(|format| {
                            ServerMessage::Exported(ExportedMessage {
                                id: id.clone(),
                                path: m.path.clone(),
                                format: format.to_string(),
                                rows: sheet.rows.len(),
                            })
                        })
                        .map_err(|e| ErrorMessage::new(&id, ErrorCode::Io, e))
                }),
            Err(e) => Err(engine_error(&id, &e)),
        },
    };

    result.unwrap_or_else(ServerMessage::Error)
}

fn match_result(id: &str, table: Table, save_as: Option<String>, store: &Store) -> ServerMessage {
    let columns = table.columns().to_vec();
    let data = table.records();
    let total = table.row_count();

    let saved_as = save_as.map(|name| {
        store.registry().put(table.renamed(name.clone()));
        store.persist();
        name
    });

    ServerMessage::MatchResult(MatchResultMessage {
        id: id.to_string(),
        status: MatchStatus::Success,
        multi_value_keys: Vec::new(),
        columns,
        data,
        total,
        saved_as,
    })
}

/// Place a client-supplied path under `root`. Only plain relative paths are
/// accepted, so a client cannot reach files outside the root.
fn resolve_client_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path '{}' must stay inside the server file root", requested));
            }
        }
    }
    if resolved == root {
        return Err("path must name a file".to_string());
    }
    Ok(resolved)
}

fn engine_error(id: &str, err: &MatchError) -> ErrorMessage {
    ErrorMessage::new(id, err.kind().into(), err.to_string())
}

fn send_message(stream: &mut TcpStream, msg: &ServerMessage) -> std::io::Result<()> {
    let json = serde_json::to_string(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(stream, "{}", json)?;
    stream.flush()
}

fn send_error(stream: &mut TcpStream, error: ErrorMessage) -> std::io::Result<()> {
    send_message(stream, &ServerMessage::Error(error))
}
