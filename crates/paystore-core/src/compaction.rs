//! Compaction — dead space reclamation for the store file
//!
//! Every commit appends; overwritten records and deleted keys stay in the
//! file until compaction rewrites it as a single snapshot entry holding only
//! the live state.
//!
//! Compaction uses the atomic rename pattern for crash safety:
//! 1. Write the snapshot to `<file>.compact`
//! 2. Sync the new file and take its lock
//! 3. Rename the new file over the old one (atomic on POSIX)
//! 4. Sync the parent directory
//!
//! If the process crashes at any point:
//! - Before rename: original file is intact, temp file is orphaned and
//!   removed by the next compaction (a failed rename removes it at once)
//! - After rename: new file is the compacted version (correct)

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;
use crate::durability::{sync_file, sync_parent};
use crate::error::{StoreError, StoreResult};
use crate::format::{encode_file_header, serialize_entry, Batch, EntryType};
use crate::lock::lock_exclusive;
use crate::log::{open_options, LogWriter};
use crate::state::State;

/// Result of a compaction operation.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// Path to the compacted file
    pub file_path: PathBuf,
    /// File size before compaction
    pub original_bytes: u64,
    /// File size after compaction
    pub compacted_bytes: u64,
    /// Namespaces carried into the new file
    pub namespaces: usize,
    /// Transaction id recorded in the snapshot
    pub txid: u64,
}

impl CompactionResult {
    /// Ratio of dead space in the original file (0.0 = no waste, 1.0 = all waste).
    pub fn dead_space_ratio(&self) -> f64 {
        dead_space_ratio(self.original_bytes, self.compacted_bytes)
    }

    /// Space saved in bytes.
    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.compacted_bytes)
    }
}

/// Share of `file_bytes` not needed to hold `live_bytes` of state.
pub fn dead_space_ratio(file_bytes: u64, live_bytes: u64) -> f64 {
    if file_bytes == 0 || live_bytes >= file_bytes {
        return 0.0;
    }
    1.0 - (live_bytes as f64 / file_bytes as f64)
}

/// Whether a file of `file_bytes` holding `live_bytes` should be compacted on open.
pub fn needs_compaction(file_bytes: u64, live_bytes: u64, config: &Config) -> bool {
    file_bytes >= config.compaction_min_file_bytes
        && dead_space_ratio(file_bytes, live_bytes) > config.compaction_trigger_ratio
}

fn compact_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

/// Rewrite the store file at `path` so it holds only `state`.
///
/// Returns a writer positioned at the end of the new file. The new file is
/// locked before it replaces the old one, so no other opener can slip in
/// between the rename and the handover.
pub(crate) fn compact_file(path: &Path, state: &State, original_bytes: u64) -> StoreResult<(LogWriter, CompactionResult)> {
    let compact_path = compact_path_for(path);

    match fs::remove_file(&compact_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::io_at(&compact_path, "Failed to remove stale compact file", e)),
    }

    let written = write_snapshot(&compact_path, state);
    let (file, compacted_bytes) = match written {
        Ok(done) => done,
        Err(e) => {
            let _ = fs::remove_file(&compact_path);
            return Err(e);
        }
    };

    // Atomic rename — replace original with compacted
    if let Err(e) = fs::rename(&compact_path, path) {
        drop(file);
        let _ = fs::remove_file(&compact_path);
        return Err(StoreError::io_at(path, "Failed to rename compacted file", e));
    }

    // Persist the rename itself. The new file is already in place, so a
    // failure here must not strand the caller on the unlinked old inode.
    if let Err(e) = sync_parent(path) {
        warn!(error = %e, "Failed to sync directory after compaction");
    }

    let result = CompactionResult {
        file_path: path.to_path_buf(),
        original_bytes,
        compacted_bytes,
        namespaces: state.namespace_count(),
        txid: state.txid,
    };
    Ok((LogWriter::from_parts(file, path.to_path_buf(), compacted_bytes), result))
}

fn write_snapshot(compact_path: &Path, state: &State) -> StoreResult<(fs::File, u64)> {
    let mut file = open_options()
        .create_new(true)
        .open(compact_path)
        .map_err(|e| StoreError::io_at(compact_path, "Failed to create compact file", e))?;
    lock_exclusive(&file, compact_path)?;

    let snapshot = Batch { entry_type: EntryType::Snapshot, txid: state.txid, ops: state.snapshot_ops() };
    let mut bytes = encode_file_header().to_vec();
    bytes.extend_from_slice(&serialize_entry(&snapshot));

    file.write_all(&bytes)
        .map_err(|e| StoreError::io_at(compact_path, "Failed to write compacted snapshot", e))?;
    sync_file(&file, compact_path, "writing compacted snapshot")?;

    Ok((file, bytes.len() as u64))
}
