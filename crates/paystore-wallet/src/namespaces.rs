//! Namespace layout of a wallet store.
//!
//! ```text
//! paymentRequests          hash -> payment request bytes
//! payments                 8-byte BE sequence -> payment record bytes
//!   paymentsSyncInfo       lastSentPaymentTime, lastSettledIndex
//! account                  "account" -> account blob
//! swap_addresses           address -> JSON SwapAddressInfo
//! ```

use paystore_core::{NamespaceMut, StoreError, StoreResult, UpdateTx};

pub const PAYMENT_REQUESTS: &[u8] = b"paymentRequests";
pub const PAYMENTS: &[u8] = b"payments";
pub const PAYMENTS_SYNC_INFO: &[u8] = b"paymentsSyncInfo";
pub const ACCOUNT: &[u8] = b"account";
pub const SWAP_ADDRESSES: &[u8] = b"swap_addresses";

pub const ACCOUNT_KEY: &[u8] = b"account";
pub const LAST_SENT_PAYMENT_TIME: &[u8] = b"lastSentPaymentTime";
pub const LAST_SETTLED_INDEX: &[u8] = b"lastSettledIndex";

/// Error for a namespace the layout should have created.
pub(crate) fn missing(name: &[u8]) -> StoreError {
    StoreError::NamespaceNotFound { name: String::from_utf8_lossy(name).into_owned() }
}

/// Top-level namespace `name`, created if absent.
pub fn ensure_namespace<'tx>(tx: &'tx mut UpdateTx, name: &[u8]) -> StoreResult<NamespaceMut<'tx>> {
    tx.create_namespace_if_not_exists(name)
}

/// Namespace `child` nested in top-level `parent`, both created if absent.
pub fn ensure_nested_namespace<'tx>(
    tx: &'tx mut UpdateTx,
    parent: &[u8],
    child: &[u8],
) -> StoreResult<NamespaceMut<'tx>> {
    ensure_namespace(tx, parent)?.into_created_namespace(child)
}

/// Create every namespace a wallet store needs. Idempotent.
pub fn ensure_layout(tx: &mut UpdateTx) -> StoreResult<()> {
    ensure_namespace(tx, PAYMENT_REQUESTS)?;
    ensure_nested_namespace(tx, PAYMENTS, PAYMENTS_SYNC_INFO)?;
    ensure_namespace(tx, ACCOUNT)?;
    ensure_namespace(tx, SWAP_ADDRESSES)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paystore_core::{Config, Store};
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("wallet.db"), Config::default()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_layout_created() {
        let (store, _dir) = create_test_store();
        store.update(ensure_layout).unwrap();

        store
            .view(|tx| -> StoreResult<()> {
                for name in [PAYMENT_REQUESTS, PAYMENTS, ACCOUNT, SWAP_ADDRESSES] {
                    assert!(tx.namespace(name).is_some());
                }
                let payments = tx.namespace(PAYMENTS).unwrap();
                assert!(payments.namespace(PAYMENTS_SYNC_INFO).is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_layout_is_idempotent() {
        let (store, _dir) = create_test_store();
        store.update(ensure_layout).unwrap();
        let after_first = store.stats();

        store.update(ensure_layout).unwrap();
        assert_eq!(store.stats(), after_first, "second pass must not write");
        assert_eq!(after_first.namespaces, 5);
    }

    #[test]
    fn test_nested_handle_writes_into_child() {
        let (store, _dir) = create_test_store();
        store
            .update(|tx| ensure_nested_namespace(tx, PAYMENTS, PAYMENTS_SYNC_INFO)?.put(LAST_SETTLED_INDEX, &[0; 8]))
            .unwrap();

        store
            .view(|tx| -> StoreResult<()> {
                let payments = tx.namespace(PAYMENTS).unwrap();
                assert_eq!(payments.get(LAST_SETTLED_INDEX), None);
                let sync = payments.namespace(PAYMENTS_SYNC_INFO).unwrap();
                assert_eq!(sync.get(LAST_SETTLED_INDEX), Some(&[0u8; 8][..]));
                Ok(())
            })
            .unwrap();
    }
}
