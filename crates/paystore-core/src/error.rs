//! Error types for Paystore operations
//!
//! All engine errors are represented by the StoreError enum, which carries
//! enough context (paths, offsets, sizes) to diagnose a bad store file.

use std::path::PathBuf;

use thiserror::Error;

/// Paystore error types with detailed context
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// I/O operation failed
    #[error("I/O error{}: {message} ({kind})", fmt_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// The store file is not a file this engine can read
    #[error("Store file {} corrupted at offset {offset}: {reason}", .path.display())]
    Corrupted {
        /// Path to the corrupted file
        path: PathBuf,
        /// Byte offset where corruption was detected
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch in {} at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}", .path.display())]
    ChecksumMismatch {
        /// File where checksum failed
        path: PathBuf,
        /// Expected checksum value
        expected: u32,
        /// Actual checksum computed
        actual: u32,
        /// Byte offset of the corrupted data
        offset: u64,
    },

    /// Torn write detected (partial write at end of file)
    #[error("Torn write in {} at offset {offset}: expected {expected_size} bytes, only {available_bytes} available", .path.display())]
    TornWrite {
        /// File with torn write
        path: PathBuf,
        /// Expected entry size
        expected_size: u32,
        /// Actual bytes available
        available_bytes: u64,
        /// Offset where torn write begins
        offset: u64,
    },

    /// Magic bytes not found at expected location
    #[error("Magic bytes not found in {} at offset {offset}: found {}", .path.display(), hex4(.found_bytes))]
    NoMagicFound {
        /// File being read
        path: PathBuf,
        /// Offset where magic was expected
        offset: u64,
        /// Bytes actually found
        found_bytes: [u8; 4],
    },

    /// Entry size exceeds maximum allowed
    #[error("Entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        /// Size of the oversized entry
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
        /// Whether it's the key or value that's oversized
        component: String,
    },

    /// Zero-length keys are not addressable
    #[error("Key must not be empty")]
    EmptyKey,

    /// A namespace the caller relies on was never created
    #[error("Namespace not found: {name}")]
    NamespaceNotFound {
        /// Lossy rendering of the namespace name
        name: String,
    },

    /// A key was used as a record where a nested namespace lives, or vice versa
    #[error("Incompatible value at key {key}: record and nested namespace share a key")]
    IncompatibleValue {
        /// Lossy rendering of the key
        key: String,
    },

    /// Another live handle holds the store file
    #[error("Store file {} is locked by another handle", .path.display())]
    Locked {
        /// Path of the locked store file
        path: PathBuf,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn io_at(path: &std::path::Path, message: &str, err: std::io::Error) -> Self {
        StoreError::Io {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("{}: {}", message, err),
        }
    }

    /// True for the errors that describe a damaged store file.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupted { .. }
                | StoreError::ChecksumMismatch { .. }
                | StoreError::TornWrite { .. }
                | StoreError::NoMagicFound { .. }
        )
    }
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

fn hex4(bytes: &[u8; 4]) -> String {
    format!("{:02x}{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Convert std::io::Error to StoreError::Io
impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Paystore operations
pub type StoreResult<T> = Result<T, StoreError>;
