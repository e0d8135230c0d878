//! Generic record accessors: one transaction per call.
//!
//! These do not compose with other writes. Components that need several
//! writes to land together run their own update transaction instead.

use paystore_core::{Store, StoreResult};

use crate::namespaces::missing;

/// Upsert `value` under `key` in the top-level `namespace`.
pub fn save_item(store: &Store, namespace: &[u8], key: &[u8], value: &[u8]) -> StoreResult<()> {
    store.update(|tx| match tx.namespace_mut(namespace) {
        Some(mut ns) => ns.put(key, value),
        None => Err(missing(namespace)),
    })
}

/// Record stored under `key` in the top-level `namespace`, `None` when absent.
pub fn fetch_item(store: &Store, namespace: &[u8], key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
    store.view(|tx| {
        let ns = tx.namespace(namespace).ok_or_else(|| missing(namespace))?;
        Ok(ns.get(key).map(<[u8]>::to_vec))
    })
}
