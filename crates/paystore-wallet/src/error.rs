//! Error types for the wallet layer

use paystore_core::StoreError;
use thiserror::Error;

/// Wallet database errors
#[derive(Error, Debug)]
pub enum WalletDbError {
    /// The storage engine refused or failed the operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A swap address record could not be encoded or decoded
    #[error("Swap address record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No swap address record is stored under this address
    #[error("Swap address not found: {0}")]
    SwapAddressNotFound(String),

    /// A sync watermark is not an 8-byte big-endian integer
    #[error("Watermark {key} holds {len} bytes, expected 8")]
    MalformedWatermark {
        /// Watermark key
        key: String,
        /// Length of the stored value
        len: usize,
    },
}

impl WalletDbError {
    /// True when the underlying store file is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(self, WalletDbError::Store(e) if e.is_corruption())
    }
}

/// Result type alias for wallet operations
pub type WalletDbResult<T> = Result<T, WalletDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_pass_through() {
        let err: WalletDbError = StoreError::EmptyKey.into();
        assert_eq!(err.to_string(), StoreError::EmptyKey.to_string());
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_watermark_message() {
        let err = WalletDbError::MalformedWatermark { key: "lastSettledIndex".into(), len: 3 };
        assert_eq!(err.to_string(), "Watermark lastSettledIndex holds 3 bytes, expected 8");
    }
}
