//! Account state: one opaque blob, last write wins.

use paystore_core::Store;

use crate::accessors::{fetch_item, save_item};
use crate::error::WalletDbResult;
use crate::namespaces::{ACCOUNT, ACCOUNT_KEY};

#[derive(Debug, Clone, Copy)]
pub struct AccountStore<'a> {
    store: &'a Store,
}

impl<'a> AccountStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn save_account(&self, account: &[u8]) -> WalletDbResult<()> {
        Ok(save_item(self.store, ACCOUNT, ACCOUNT_KEY, account)?)
    }

    /// `None` until an account has been saved.
    pub fn fetch_account(&self) -> WalletDbResult<Option<Vec<u8>>> {
        Ok(fetch_item(self.store, ACCOUNT, ACCOUNT_KEY)?)
    }
}
