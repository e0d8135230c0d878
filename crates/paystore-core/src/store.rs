//! Store — the transactional handle over one store file.
//!
//! A Store combines the committed state (an `Arc<State>` behind an RwLock)
//! with the commit log (a `LogWriter` behind a Mutex).
//!
//! **Read path**: clone the `Arc` and read it lock-free for the whole view
//! **Write path**: hold the log Mutex, mutate a private copy, append one
//! entry, then publish the new `Arc` with a brief write lock
//! **Compaction**: rewrite the file as a single snapshot, on open when the
//! dead space passes the configured ratio or on demand

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::compaction::{compact_file, needs_compaction, CompactionResult};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::format::{Batch, EntryType};
use crate::log::{LogWriter, Recovery};
use crate::state::State;
use crate::tx::{UpdateTx, ViewTx};

/// Point-in-time size and shape of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Bytes currently in the store file
    pub file_bytes: u64,
    /// Bytes the file would hold right after compaction
    pub live_bytes: u64,
    /// Id of the last committed transaction
    pub txid: u64,
    /// Number of namespaces, nested ones included
    pub namespaces: usize,
}

/// Embedded transactional store over a single file.
///
/// All public methods take `&self`, so a `Store` can be shared across
/// threads behind an `Arc`. Any number of view transactions run at once;
/// update transactions are serialized by the log Mutex.
pub struct Store {
    /// Last committed state; readers clone the Arc
    state: RwLock<Arc<State>>,
    /// Commit log; held for the whole of an update transaction
    log: Mutex<LogWriter>,
    /// Store file path
    path: PathBuf,
    config: Config,
}

impl Store {
    /// Open or create the store file at `path`.
    ///
    /// Takes an exclusive lock on the file, replays every intact entry and
    /// truncates a torn tail left by a crash. Fails with `Locked` when
    /// another handle already holds the file.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        Self::open_inner(path.clone(), config).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to open store");
            e
        })
    }

    fn open_inner(path: PathBuf, config: Config) -> StoreResult<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;

        let (mut log, recovery) = LogWriter::open(&path)?;
        let replayed = recovery.entries.len();
        let state = replay(recovery, &path)?;

        let file_bytes = log.current_size();
        if needs_compaction(file_bytes, state.live_bytes(), &config) {
            match compact_file(&path, &state, file_bytes) {
                Ok((writer, result)) => {
                    debug!(
                        path = %path.display(),
                        original_bytes = result.original_bytes,
                        compacted_bytes = result.compacted_bytes,
                        "Compacted store on open"
                    );
                    log = writer;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Compaction on open failed, continuing"),
            }
        }

        info!(
            path = %path.display(),
            txid = state.txid,
            namespaces = state.namespace_count(),
            entries = replayed,
            "Opened store"
        );

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            log: Mutex::new(log),
            path,
            config,
        })
    }

    /// Run `f` against a consistent snapshot of the committed state.
    ///
    /// The snapshot does not change while `f` runs, even if updates commit
    /// on other threads in the meantime.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ViewTx) -> Result<T, E>,
    {
        let snapshot = Arc::clone(&self.state.read());
        let tx = ViewTx::new(snapshot);
        f(&tx)
    }

    /// Run `f` as a read-write transaction.
    ///
    /// WRITE ORDERING (the fundamental contract):
    /// 1. `f` mutates a private working copy
    /// 2. On `Ok`, the recorded ops are appended as one log entry
    ///    (durable when `sync_on_commit` is set)
    /// 3. Only then is the working copy published to readers
    ///
    /// On `Err` from `f`, or a failed append, nothing is written and readers
    /// keep seeing the previous state. A transaction that changed nothing
    /// commits without touching the file.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut UpdateTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut log = self.log.lock();
        let base = State::clone(&self.state.read());
        let mut tx = UpdateTx::new(base, &self.config);

        let out = match f(&mut tx) {
            Ok(out) => out,
            Err(e) => {
                debug!(txid = tx.txid(), pending_ops = tx.pending_ops(), "Update rolled back");
                return Err(e);
            }
        };

        let (state, ops) = tx.finish();
        if ops.is_empty() {
            return Ok(out);
        }

        let batch = Batch { entry_type: EntryType::Commit, txid: state.txid, ops };
        log.append(&batch, self.config.sync_on_commit)?;
        debug!(txid = batch.txid, ops = batch.ops.len(), "Committed transaction");
        *self.state.write() = Arc::new(state);
        Ok(out)
    }

    /// Force buffered commits to persistent storage.
    ///
    /// Only needed when `sync_on_commit` is disabled.
    pub fn sync(&self) -> StoreResult<()> {
        self.log.lock().sync()
    }

    /// Rewrite the store file so it holds only live state.
    pub fn compact(&self) -> StoreResult<CompactionResult> {
        let mut log = self.log.lock();
        let state = Arc::clone(&self.state.read());
        let (writer, result) = compact_file(&self.path, &state, log.current_size())?;
        *log = writer;
        debug!(
            path = %self.path.display(),
            original_bytes = result.original_bytes,
            compacted_bytes = result.compacted_bytes,
            "Compacted store"
        );
        Ok(result)
    }

    /// Current file size, live size and shape of the store.
    pub fn stats(&self) -> StoreStats {
        let log = self.log.lock();
        let state = self.state.read();
        StoreStats {
            file_bytes: log.current_size(),
            live_bytes: state.live_bytes(),
            txid: state.txid,
            namespaces: state.namespace_count(),
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sync and release the store file.
    pub fn close(self) -> StoreResult<()> {
        self.log.lock().sync()?;
        info!(path = %self.path.display(), "Closed store");
        Ok(())
    }

    /// Close the store, then remove its file.
    pub fn delete(self) -> StoreResult<()> {
        let path = self.path.clone();
        self.close()?;
        fs::remove_file(&path).map_err(|e| StoreError::io_at(&path, "Failed to remove store file", e))?;
        info!(path = %path.display(), "Deleted store");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("txid", &self.state.read().txid)
            .finish()
    }
}

/// Fold recovered entries into a state.
///
/// A snapshot entry is only valid as the first entry of a file, and commit
/// ids must strictly increase. Anything else means the file was not written
/// by this engine.
fn replay(recovery: Recovery, path: &Path) -> StoreResult<State> {
    let mut state = State::new();

    for entry in recovery.entries {
        let corrupted = |reason: String| StoreError::Corrupted { path: path.to_path_buf(), offset: entry.offset, reason };
        let batch = entry.batch;

        match batch.entry_type {
            EntryType::Snapshot if !state.is_pristine() => {
                return Err(corrupted("snapshot entry after other entries".to_string()));
            }
            EntryType::Commit if batch.txid <= state.txid => {
                return Err(corrupted(format!(
                    "transaction id {} does not follow {}",
                    batch.txid, state.txid
                )));
            }
            _ => {}
        }

        for op in &batch.ops {
            state.apply(op).map_err(|e| corrupted(format!("entry does not apply: {}", e)))?;
        }
        state.txid = batch.txid;
    }

    Ok(state)
}
