//! Binary format definitions for the Paystore commit log
//!
//! A store file is a 16-byte file header followed by commit entries.
//! Every committed update transaction becomes exactly one entry:
//! ChunkHeader (32 bytes) + txid(u64) + op_count(u32) + ops

use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::state::NamespaceId;

/// Magic bytes at the start of every store file: "PSDB"
pub const FILE_MAGIC: [u8; 4] = *b"PSDB";

/// Magic bytes at the start of every commit entry: "PSTX"
pub const MAGIC_ARRAY: [u8; 4] = *b"PSTX";

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// File header size in bytes
pub const FILE_HEADER_SIZE: usize = 16;

/// Entry header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Fixed payload prefix: txid(8) + op_count(4)
pub(crate) const BATCH_PREFIX_SIZE: usize = 12;

/// Entry types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    /// One committed update transaction
    Commit = 1,
    /// Full-state image written by compaction
    Snapshot = 2,
}

impl EntryType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EntryType::Commit),
            2 => Some(EntryType::Snapshot),
            _ => None,
        }
    }
}

/// A single state mutation inside a committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a namespace under `parent` (the root for top-level namespaces)
    CreateNamespace { id: NamespaceId, parent: NamespaceId, name: Vec<u8> },
    /// Insert or overwrite a record
    Put { ns: NamespaceId, key: Vec<u8>, value: Vec<u8> },
    /// Remove a record
    Delete { ns: NamespaceId, key: Vec<u8> },
    /// Set a namespace's sequence counter
    SetSequence { ns: NamespaceId, value: u64 },
}

const OP_CREATE_NAMESPACE: u8 = 1;
const OP_PUT: u8 = 2;
const OP_DELETE: u8 = 3;
const OP_SET_SEQUENCE: u8 = 4;

impl Op {
    /// Exact encoded size, used for dead-space accounting
    pub fn encoded_len(&self) -> usize {
        match self {
            Op::CreateNamespace { name, .. } => 1 + 4 + 4 + 2 + name.len(),
            Op::Put { key, value, .. } => 1 + 4 + 2 + 4 + key.len() + value.len(),
            Op::Delete { key, .. } => 1 + 4 + 2 + key.len(),
            Op::SetSequence { .. } => 1 + 4 + 8,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Op::CreateNamespace { id, parent, name } => {
                buf.push(OP_CREATE_NAMESPACE);
                buf.extend_from_slice(&id.0.to_le_bytes());
                buf.extend_from_slice(&parent.0.to_le_bytes());
                buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
                buf.extend_from_slice(name);
            }
            Op::Put { ns, key, value } => {
                buf.push(OP_PUT);
                buf.extend_from_slice(&ns.0.to_le_bytes());
                buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(value);
            }
            Op::Delete { ns, key } => {
                buf.push(OP_DELETE);
                buf.extend_from_slice(&ns.0.to_le_bytes());
                buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
                buf.extend_from_slice(key);
            }
            Op::SetSequence { ns, value } => {
                buf.push(OP_SET_SEQUENCE);
                buf.extend_from_slice(&ns.0.to_le_bytes());
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

/// A decoded commit entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub entry_type: EntryType,
    /// Transaction id, strictly increasing across the file
    pub txid: u64,
    pub ops: Vec<Op>,
}

/// Fixed-size header for each commit entry
/// Size: 32 bytes
///
/// Layout:
///   [0..4]   magic:      [u8;4] - "PSTX"
///   [4..8]   length:     u32    - payload length in bytes
///   [8..12]  checksum:   u32    - CRC32C of payload bytes
///   [12]     entry_type: u8
///   [13..16] reserved:   [u8;3]
///   [16..32] padding:    [u8;16]
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub entry_type: u8,
}

impl ChunkHeader {
    pub fn new(length: u32, checksum: u32, entry_type: EntryType) -> Self {
        Self { magic: MAGIC_ARRAY, length, checksum, entry_type: entry_type as u8 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.entry_type;
        // reserved + padding stay zeroed
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Self {
            magic,
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            entry_type: bytes[12],
        }
    }
}

/// Bytes written at offset 0 of a fresh store file
pub fn encode_file_header() -> [u8; FILE_HEADER_SIZE] {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    buf[0..4].copy_from_slice(&FILE_MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf
}

/// Verify that `bytes` is a file header this engine understands
pub fn check_file_header(bytes: &[u8], path: &Path) -> StoreResult<()> {
    if bytes.len() < FILE_HEADER_SIZE {
        return Err(StoreError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: format!("File header truncated: {} of {} bytes", bytes.len(), FILE_HEADER_SIZE),
        });
    }
    if bytes[0..4] != FILE_MAGIC {
        return Err(StoreError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: "Not a paystore file (bad magic)".to_string(),
        });
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupted {
            path: path.to_path_buf(),
            offset: 4,
            reason: format!("Unsupported format version {} (expected {})", version, FORMAT_VERSION),
        });
    }
    Ok(())
}

/// Serialize a batch into a complete commit entry
pub fn serialize_entry(batch: &Batch) -> Vec<u8> {
    let payload_size = BATCH_PREFIX_SIZE + batch.ops.iter().map(Op::encoded_len).sum::<usize>();

    let mut payload = Vec::with_capacity(payload_size);
    payload.extend_from_slice(&batch.txid.to_le_bytes());
    payload.extend_from_slice(&(batch.ops.len() as u32).to_le_bytes());
    for op in &batch.ops {
        op.encode_into(&mut payload);
    }

    let checksum = crc32c::crc32c(&payload);
    let header = ChunkHeader::new(payload.len() as u32, checksum, batch.entry_type);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    buffer
}

/// Deserialize one commit entry from the start of `data`
pub fn deserialize_entry(data: &[u8]) -> StoreResult<Batch> {
    let buffer_path = || PathBuf::from("<buffer>");

    if data.len() < HEADER_SIZE {
        return Err(StoreError::TornWrite {
            path: buffer_path(),
            expected_size: HEADER_SIZE as u32,
            available_bytes: data.len() as u64,
            offset: 0,
        });
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = ChunkHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(StoreError::NoMagicFound {
            path: buffer_path(),
            offset: 0,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: buffer_path(),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: buffer_path(),
            expected: header.checksum,
            actual: computed,
            offset: HEADER_SIZE as u64,
        });
    }

    let entry_type = EntryType::from_u8(header.entry_type).ok_or_else(|| StoreError::Corrupted {
        path: buffer_path(),
        offset: 12,
        reason: format!("Invalid entry type: {}", header.entry_type),
    })?;

    let mut reader = PayloadReader { buf: payload, pos: 0 };
    let txid = reader.u64()?;
    let op_count = reader.u32()? as usize;

    // Every op is at least 7 bytes, so a larger count cannot be honest
    let mut ops = Vec::with_capacity(op_count.min(payload.len() / 7 + 1));
    for _ in 0..op_count {
        ops.push(reader.op()?);
    }
    if reader.pos != payload.len() {
        return Err(reader.corrupted(format!("{} trailing bytes after ops", payload.len() - reader.pos)));
    }

    Ok(Batch { entry_type, txid, ops })
}

/// Bounds-checked little-endian reader over a verified payload
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn corrupted(&self, reason: String) -> StoreError {
        StoreError::Corrupted {
            path: PathBuf::from("<buffer>"),
            offset: (HEADER_SIZE + self.pos) as u64,
            reason,
        }
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(self.corrupted(format!("Payload too short: need {} more bytes", n)));
        }
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn op(&mut self) -> StoreResult<Op> {
        let tag = self.u8()?;
        match tag {
            OP_CREATE_NAMESPACE => {
                let id = NamespaceId(self.u32()?);
                let parent = NamespaceId(self.u32()?);
                let name_len = self.u16()? as usize;
                let name = self.take(name_len)?.to_vec();
                Ok(Op::CreateNamespace { id, parent, name })
            }
            OP_PUT => {
                let ns = NamespaceId(self.u32()?);
                let key_len = self.u16()? as usize;
                let value_len = self.u32()? as usize;
                let key = self.take(key_len)?.to_vec();
                let value = self.take(value_len)?.to_vec();
                Ok(Op::Put { ns, key, value })
            }
            OP_DELETE => {
                let ns = NamespaceId(self.u32()?);
                let key_len = self.u16()? as usize;
                let key = self.take(key_len)?.to_vec();
                Ok(Op::Delete { ns, key })
            }
            OP_SET_SEQUENCE => {
                let ns = NamespaceId(self.u32()?);
                let value = self.u64()?;
                Ok(Op::SetSequence { ns, value })
            }
            other => Err(self.corrupted(format!("Invalid operation type: {}", other))),
        }
    }
}
