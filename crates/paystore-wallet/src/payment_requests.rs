//! Incoming payment requests keyed by payment hash.

use paystore_core::Store;

use crate::accessors::{fetch_item, save_item};
use crate::error::WalletDbResult;
use crate::namespaces::PAYMENT_REQUESTS;

#[derive(Debug, Clone, Copy)]
pub struct PaymentRequests<'a> {
    store: &'a Store,
}

impl<'a> PaymentRequests<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn save_payment_request(&self, hash: &str, request: &[u8]) -> WalletDbResult<()> {
        Ok(save_item(self.store, PAYMENT_REQUESTS, hash.as_bytes(), request)?)
    }

    pub fn fetch_payment_request(&self, hash: &str) -> WalletDbResult<Option<Vec<u8>>> {
        Ok(fetch_item(self.store, PAYMENT_REQUESTS, hash.as_bytes())?)
    }
}
