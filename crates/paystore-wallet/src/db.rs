//! `WalletDb`: the owned store handle with the wallet layout in place.

use std::path::Path;

use paystore_core::{CompactionResult, Config, Store};
use tracing::info;

use crate::account::AccountStore;
use crate::error::WalletDbResult;
use crate::namespaces::ensure_layout;
use crate::payment_requests::PaymentRequests;
use crate::payments::PaymentLedger;
use crate::swap::SwapAddressRegistry;

/// Wallet database over a single store file.
///
/// Owns the `Store`; components borrow it and each of their calls runs as
/// its own transaction.
pub struct WalletDb {
    store: Store,
}

impl WalletDb {
    /// Open or create the wallet store at `path` and create any missing namespaces.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> WalletDbResult<Self> {
        let store = Store::open(path, config)?;
        store.update(ensure_layout)?;
        info!(path = %store.path().display(), "Wallet database ready");
        Ok(Self { store })
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn payments(&self) -> PaymentLedger<'_> {
        PaymentLedger::new(&self.store)
    }

    pub fn account(&self) -> AccountStore<'_> {
        AccountStore::new(&self.store)
    }

    pub fn payment_requests(&self) -> PaymentRequests<'_> {
        PaymentRequests::new(&self.store)
    }

    pub fn swap_addresses(&self) -> SwapAddressRegistry<'_> {
        SwapAddressRegistry::new(&self.store)
    }

    /// Reclaim space left by overwritten and deleted records.
    pub fn compact(&self) -> WalletDbResult<CompactionResult> {
        Ok(self.store.compact()?)
    }

    /// Sync and release the store file.
    pub fn close(self) -> WalletDbResult<()> {
        Ok(self.store.close()?)
    }

    /// Close and remove the store file.
    pub fn delete(self) -> WalletDbResult<()> {
        Ok(self.store.delete()?)
    }
}

impl std::fmt::Debug for WalletDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletDb").field("path", &self.store.path()).finish()
    }
}
