//! The process-wide table registry plus its on-disk snapshot.
//!
//! The registry is loaded once at startup. After every mutation a copy of
//! the table list (cheap `Arc` clones taken under the registry's read lock)
//! is handed to a background writer thread, so no lock is held during I/O.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use sheetjoin_engine::{Table, TableRegistry};
use sheetjoin_io::snapshot;

pub struct Store {
    registry: TableRegistry,
    writer: SnapshotWriter,
}

impl Store {
    /// Load the snapshot at `path`. An unreadable snapshot is logged and the
    /// registry starts empty; the next save replaces it.
    pub fn open(path: &Path) -> Self {
        let registry = match snapshot::load(path) {
            Ok(tables) => {
                log::debug!("Loaded {} table(s) from {}", tables.len(), path.display());
                TableRegistry::from_tables(tables)
            }
            Err(e) => {
                log::warn!("Failed to load snapshot {}: {}; starting empty", path.display(), e);
                TableRegistry::new()
            }
        };
        Self { registry, writer: SnapshotWriter::spawn(path.to_path_buf()) }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Queue the current table set for saving.
    pub fn persist(&self) {
        self.writer.submit(&self.registry);
    }

    /// Wait for queued snapshots to be written. Dropping the store does the
    /// same; this makes the shutdown point explicit.
    pub fn close(mut self) {
        self.writer.flush();
    }
}

/// Background snapshot writer.
///
/// Submissions are serialized through one sender so the channel order
/// matches the order the snapshots were taken in. The thread always writes
/// the newest snapshot it has and skips any that were superseded.
pub struct SnapshotWriter {
    tx: Mutex<Option<Sender<Vec<Arc<Table>>>>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || run_writer(rx, path));
        Self { tx: Mutex::new(Some(tx)), handle: Some(handle) }
    }

    pub fn submit(&self, registry: &TableRegistry) {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            log::warn!("Snapshot writer already stopped; change not persisted");
            return;
        };
        if tx.send(registry.snapshot()).is_err() {
            log::warn!("Snapshot writer thread exited; change not persisted");
        }
    }

    /// Close the channel and join the thread. Later submissions are dropped.
    pub fn flush(&mut self) {
        self.tx.lock().take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Snapshot writer thread panicked");
            }
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

fn run_writer(rx: Receiver<Vec<Arc<Table>>>, path: PathBuf) {
    while let Ok(mut tables) = rx.recv() {
        // Coalesce: only the newest queued snapshot matters.
        while let Ok(newer) = rx.try_recv() {
            tables = newer;
        }
        match snapshot::save(&tables, &path) {
            Ok(()) => log::debug!("Saved {} table(s) to {}", tables.len(), path.display()),
            Err(e) => log::warn!("Failed to save snapshot {}: {}", path.display(), e),
        }
    }
}
