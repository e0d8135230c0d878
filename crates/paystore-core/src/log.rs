//! Commit log for Paystore
//!
//! The store file is an append-only log of committed transactions. Durability
//! comes from careful write ordering:
//! 1. Serialize the whole transaction into one checksummed entry
//! 2. Append the entry to the store file
//! 3. Sync the file so the entry reaches persistent storage
//! 4. Return success (caller publishes the new state AFTER this returns)
//!
//! A transaction is therefore all-or-nothing on disk as well as in RAM: an
//! entry either replays completely or, as the torn last entry, is discarded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::format::{
    check_file_header, deserialize_entry, encode_file_header, serialize_entry, Batch, FILE_HEADER_SIZE,
    HEADER_SIZE, MAGIC_ARRAY,
};
use crate::lock::lock_exclusive;
use crate::durability::sync_file;

/// Open a store file for appending: owner-only permissions on creation.
pub(crate) fn open_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

/// Appends committed transactions to the store file.
///
/// CRITICAL INVARIANT: append() must complete (including the sync)
/// BEFORE the caller publishes the transaction's state to readers.
pub struct LogWriter {
    /// Store file handle, also the holder of the exclusive lock
    file: File,
    /// Path to the store file (for error context)
    path: PathBuf,
    /// Bytes of valid log (tracked to avoid stat calls)
    size: u64,
}

impl LogWriter {
    /// Open or create the store file at `path`, lock it and recover its entries.
    ///
    /// A fresh (empty) file gets a header. A damaged entry at the end of the
    /// file, left by a crash mid-append, is truncated away; damage anywhere
    /// earlier fails the open with `Corrupted`.
    pub fn open(path: &Path) -> StoreResult<(Self, Recovery)> {
        let mut file = open_options()
            .create(true)
            .open(path)
            .map_err(|e| StoreError::io_at(path, "Failed to open store file", e))?;

        lock_exclusive(&file, path)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| StoreError::io_at(path, "Failed to read store file", e))?;

        if buffer.is_empty() {
            file.write_all(&encode_file_header())
                .map_err(|e| StoreError::io_at(path, "Failed to write file header", e))?;
            sync_file(&file, path, "writing file header")?;
            let writer = Self { file, path: path.to_path_buf(), size: FILE_HEADER_SIZE as u64 };
            return Ok((writer, Recovery::default()));
        }

        check_file_header(&buffer, path)?;
        let recovery = recover_entries(&buffer, path)?;

        if recovery.valid_len < buffer.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len = recovery.valid_len,
                file_len = buffer.len(),
                "Truncating damaged tail of store file"
            );
            file.set_len(recovery.valid_len)
                .map_err(|e| StoreError::io_at(path, "Failed to truncate torn tail", e))?;
            sync_file(&file, path, "truncation")?;
        }

        let writer = Self { file, path: path.to_path_buf(), size: recovery.valid_len };
        Ok((writer, recovery))
    }

    /// Wrap a handle that already holds a complete, locked store file.
    pub(crate) fn from_parts(file: File, path: PathBuf, size: u64) -> Self {
        Self { file, path, size }
    }

    /// Append one committed transaction.
    ///
    /// With `durable` set, returns only after the sync succeeds. On any
    /// failure the file is cut back to its previous length so a half-written
    /// entry never sits in front of the next commit.
    pub fn append(&mut self, batch: &Batch, durable: bool) -> StoreResult<()> {
        let entry_bytes = serialize_entry(batch);

        if let Err(e) = self.file.write_all(&entry_bytes) {
            self.cut_back();
            return Err(StoreError::io_at(&self.path, "Commit write failed", e));
        }

        if durable {
            // After this returns Ok, the entry WILL survive power loss
            if let Err(e) = sync_file(&self.file, &self.path, "commit") {
                self.cut_back();
                return Err(e);
            }
        }

        self.size += entry_bytes.len() as u64;
        Ok(())
    }

    fn cut_back(&mut self) {
        if let Err(e) = self.file.set_len(self.size) {
            warn!(path = %self.path.display(), error = %e, "Failed to roll back partial commit");
        }
    }

    /// Sync the store file without writing anything.
    /// Call this after commits made with `sync_on_commit` disabled.
    pub fn sync(&self) -> StoreResult<()> {
        sync_file(&self.file, &self.path, "explicit sync request")
    }

    /// Size of the store file in bytes
    pub fn current_size(&self) -> u64 {
        self.size
    }
}

/// One entry read back from the log
#[derive(Debug, Clone)]
pub struct RecoveredEntry {
    /// File offset of the entry header
    pub offset: u64,
    pub batch: Batch,
}

/// Result of scanning a store file
#[derive(Debug, Clone)]
pub struct Recovery {
    /// Intact entries in file order
    pub entries: Vec<RecoveredEntry>,
    /// Offset just past the last intact entry
    pub valid_len: u64,
}

impl Default for Recovery {
    fn default() -> Self {
        Self { entries: Vec::new(), valid_len: FILE_HEADER_SIZE as u64 }
    }
}

/// Recover all intact entries from a store file image.
///
/// Recovery algorithm:
/// 1. Read 32-byte entry header
/// 2. Validate magic bytes ("PSTX")
/// 3. Check payload length against remaining file size
/// 4. Verify CRC32C and decode the ops
/// 5. On any damage, look past it for another intact entry
///
/// Damage with nothing intact behind it is the tail of an append cut short
/// by a crash: recovery stops there and the caller truncates. Damage with an
/// intact entry behind it is lost committed data: `Corrupted`, and the file
/// is left untouched. So is an entry whose checksum holds but whose ops
/// cannot be decoded.
pub fn recover_entries(buffer: &[u8], path: &Path) -> StoreResult<Recovery> {
    let mut recovery = Recovery::default();
    let mut offset = FILE_HEADER_SIZE;

    while offset < buffer.len() {
        let reason = match entry_at(buffer, offset) {
            Ok(Ok(batch)) => {
                let end = offset + HEADER_SIZE + batch_len(buffer, offset);
                recovery.entries.push(RecoveredEntry { offset: offset as u64, batch });
                offset = end;
                recovery.valid_len = offset as u64;
                continue;
            }
            Ok(Err(StoreError::Corrupted { offset: inner, reason, .. })) => {
                return Err(StoreError::Corrupted {
                    path: path.to_path_buf(),
                    offset: offset as u64 + inner,
                    reason,
                });
            }
            Ok(Err(e)) => e.to_string(),
            Err(reason) => reason,
        };

        if let Some(next) = intact_entry_after(buffer, offset + 1) {
            return Err(StoreError::Corrupted {
                path: path.to_path_buf(),
                offset: offset as u64,
                reason: format!("{} (intact entry follows at offset {})", reason, next),
            });
        }

        warn!(offset, file_len = buffer.len(), reason = %reason, "Damaged tail in store file");
        break;
    }

    Ok(recovery)
}

/// Frame and decode the entry starting at `offset`.
///
/// The outer `Err` is a framing failure (no room for a header, bad magic,
/// length past the end of the file); the inner result is the decode.
fn entry_at(buffer: &[u8], offset: usize) -> Result<StoreResult<Batch>, String> {
    if offset + HEADER_SIZE > buffer.len() {
        return Err(format!("incomplete entry header ({} bytes)", buffer.len() - offset));
    }
    if buffer[offset..offset + 4] != MAGIC_ARRAY {
        return Err("bad entry magic".to_string());
    }
    let total_entry_size = HEADER_SIZE + batch_len(buffer, offset);
    if offset + total_entry_size > buffer.len() {
        return Err(format!(
            "entry needs {} bytes, {} available",
            total_entry_size,
            buffer.len() - offset
        ));
    }
    Ok(deserialize_entry(&buffer[offset..offset + total_entry_size]))
}

/// Payload length field of the header at `offset` (caller checked the header fits).
fn batch_len(buffer: &[u8], offset: usize) -> usize {
    u32::from_le_bytes([
        buffer[offset + 4], buffer[offset + 5],
        buffer[offset + 6], buffer[offset + 7],
    ]) as usize
}

/// Offset of the first entry at or after `start` that frames and decodes.
fn intact_entry_after(buffer: &[u8], start: usize) -> Option<usize> {
    let mut from = start;
    while let Some(candidate) = find_next_magic(buffer, from) {
        if matches!(entry_at(buffer, candidate), Ok(Ok(_))) {
            return Some(candidate);
        }
        from = candidate + 1;
    }
    None
}

/// Scan forward in buffer to find next occurrence of the entry magic.
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if start >= buffer.len() {
        return None;
    }
    buffer[start..]
        .windows(MAGIC_ARRAY.len())
        .position(|window| window == MAGIC_ARRAY)
        .map(|pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{EntryType, Op};
    use crate::state::NamespaceId;
    use tempfile::TempDir;

    fn batch(txid: u64, key: &[u8], value: &[u8]) -> Batch {
        Batch {
            entry_type: EntryType::Commit,
            txid,
            ops: vec![Op::Put { ns: NamespaceId(1), key: key.to_vec(), value: value.to_vec() }],
        }
    }

    #[test]
    fn test_log_write_read_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wallet.db");

        let (mut writer, recovery) = LogWriter::open(&path).unwrap();
        assert!(recovery.entries.is_empty());
        assert_eq!(writer.current_size(), FILE_HEADER_SIZE as u64);

        writer.append(&batch(1, b"key1", b"value1"), true).unwrap();
        writer.append(&batch(2, b"key2", b"value2"), false).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let (writer, recovery) = LogWriter::open(&path).unwrap();
        assert_eq!(recovery.entries.len(), 2);
        assert_eq!(recovery.entries[0].offset, FILE_HEADER_SIZE as u64);
        assert_eq!(recovery.entries[1].batch, batch(2, b"key2", b"value2"));
        assert_eq!(writer.current_size(), std::fs::metadata(&path).unwrap().len());
    }

    /// Four commits; returns the path and the offset of the second entry.
    fn four_commits(temp: &TempDir) -> (std::path::PathBuf, usize) {
        let path = temp.path().join("wallet.db");
        let (mut writer, _) = LogWriter::open(&path).unwrap();
        writer.append(&batch(1, b"good1", b"val1"), true).unwrap();
        let second_start = writer.current_size() as usize;
        for txid in 2..=4 {
            writer.append(&batch(txid, b"good", b"val"), true).unwrap();
        }
        (path, second_start)
    }

    fn assert_corrupted_untouched(path: &Path, damaged: &[u8], at: usize) {
        match LogWriter::open(path) {
            Err(StoreError::Corrupted { offset, .. }) => assert_eq!(offset, at as u64),
            Err(e) => panic!("expected Corrupted, got {:?}", e),
            Ok(_) => panic!("damaged store must not open"),
        }
        assert_eq!(std::fs::read(path).unwrap(), damaged);
    }

    #[test]
    fn test_checksum_failure_mid_file_is_corrupted() {
        let temp = TempDir::new().unwrap();
        let (path, second_start) = four_commits(&temp);

        // Flip a payload byte of the second entry
        let mut data = std::fs::read(&path).unwrap();
        data[second_start + HEADER_SIZE + 14] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        assert_corrupted_untouched(&path, &data, second_start);
    }

    #[test]
    fn test_length_overrun_mid_file_is_corrupted() {
        let temp = TempDir::new().unwrap();
        let (path, second_start) = four_commits(&temp);

        // High byte of the second entry's length: now claims ~2 GiB
        let mut data = std::fs::read(&path).unwrap();
        data[second_start + 7] = 0x7F;
        std::fs::write(&path, &data).unwrap();

        assert_corrupted_untouched(&path, &data, second_start);
    }

    #[test]
    fn test_bad_magic_mid_file_is_corrupted() {
        let temp = TempDir::new().unwrap();
        let (path, second_start) = four_commits(&temp);

        let mut data = std::fs::read(&path).unwrap();
        data[second_start] = b'X';
        std::fs::write(&path, &data).unwrap();

        assert_corrupted_untouched(&path, &data, second_start);
    }

    #[test]
    fn test_checksum_failure_in_last_entry_truncated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wallet.db");

        let (mut writer, _) = LogWriter::open(&path).unwrap();
        writer.append(&batch(1, b"good1", b"val1"), true).unwrap();
        writer.append(&batch(2, b"good2", b"val2"), true).unwrap();
        let good_len = writer.current_size();
        writer.append(&batch(3, b"last", b"val3"), true).unwrap();
        drop(writer);

        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        let (writer, recovery) = LogWriter::open(&path).unwrap();
        let txids: Vec<u64> = recovery.entries.iter().map(|e| e.batch.txid).collect();
        assert_eq!(txids, vec![1, 2]);
        assert_eq!(writer.current_size(), good_len);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn test_torn_write_truncated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wallet.db");

        let (mut writer, _) = LogWriter::open(&path).unwrap();
        writer.append(&batch(1, b"complete", b"entry"), true).unwrap();
        let good_len = writer.current_size();
        drop(writer);

        // Simulate a crash mid-append: header of an entry with no payload
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&MAGIC_ARRAY);
        data.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00]);
        std::fs::write(&path, data).unwrap();

        let (mut writer, recovery) = LogWriter::open(&path).unwrap();
        assert_eq!(recovery.entries.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

        // Appends continue cleanly after the cut
        writer.append(&batch(2, b"next", b"entry"), true).unwrap();
        drop(writer);
        let (_writer, recovery) = LogWriter::open(&path).unwrap();
        assert_eq!(recovery.entries.len(), 2);
    }

    #[test]
    fn test_foreign_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"just some text that is long enough").unwrap();

        assert!(matches!(LogWriter::open(&path), Err(StoreError::Corrupted { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wallet.db");
        let _ = LogWriter::open(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_find_next_magic() {
        let mut buffer = vec![0u8; 10];
        buffer.extend_from_slice(&MAGIC_ARRAY);
        assert_eq!(find_next_magic(&buffer, 0), Some(10));
        assert_eq!(find_next_magic(&buffer, 11), None);
        assert_eq!(find_next_magic(&buffer, 100), None);
    }

    #[test]
    fn test_intact_entry_after_skips_false_magic() {
        let mut buffer = encode_file_header().to_vec();
        // Magic with a bogus length, then a real entry
        buffer.extend_from_slice(&MAGIC_ARRAY);
        buffer.extend_from_slice(&[0x00; 4]);
        let real = buffer.len();
        buffer.extend_from_slice(&serialize_entry(&batch(7, b"k", b"v")));

        assert_eq!(intact_entry_after(&buffer, FILE_HEADER_SIZE), Some(real));
        assert_eq!(intact_entry_after(&buffer, real + 1), None);
    }
}
