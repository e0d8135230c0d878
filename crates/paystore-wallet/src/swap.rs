//! Swap address registry: JSON records keyed by their own address.
//!
//! Lookups by anything other than the address (payment hash, predicate)
//! are full scans in key order. Every record is decoded during a scan, and
//! a record that fails to decode aborts the operation.

use paystore_core::Store;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::accessors::save_item;
use crate::error::{WalletDbError, WalletDbResult};
use crate::namespaces::{missing, SWAP_ADDRESSES};

/// One swap address and the state of funds sent to it.
///
/// Field names are PascalCase on the wire and byte fields are standard
/// base64 strings. Absent fields decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SwapAddressInfo {
    pub address: String,
    pub creation_timestamp: i64,
    #[serde(with = "base64_bytes")]
    pub payment_hash: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub preimage: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub private_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub script: Vec<u8>,
    pub payment_request: String,
    pub confirmed_amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub confirmed_transaction_ids: Vec<String>,
    pub paid_amount: i64,
    pub lock_height: u32,
    pub error_message: String,
    pub entered_mempool: bool,
}

impl SwapAddressInfo {
    pub fn to_json(&self) -> WalletDbResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> WalletDbResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Byte strings as base64 text; `null` reads as empty.
mod base64_bytes {
    use base64::prelude::{Engine, BASE64_STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(text) => BASE64_STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Swap address registry over a borrowed store.
#[derive(Debug, Clone, Copy)]
pub struct SwapAddressRegistry<'a> {
    store: &'a Store,
}

impl<'a> SwapAddressRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or replace the record stored under `info.address`.
    pub fn save_swap_address(&self, info: &SwapAddressInfo) -> WalletDbResult<()> {
        let bytes = info.to_json()?;
        save_item(self.store, SWAP_ADDRESSES, info.address.as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn fetch_all_swap_addresses(&self) -> WalletDbResult<Vec<SwapAddressInfo>> {
        self.fetch_swap_addresses(|_| true)
    }

    /// Records for which `predicate` holds, in address order.
    pub fn fetch_swap_addresses<P>(&self, predicate: P) -> WalletDbResult<Vec<SwapAddressInfo>>
    where
        P: Fn(&SwapAddressInfo) -> bool,
    {
        self.store.view(|tx| {
            let addresses = tx.namespace(SWAP_ADDRESSES).ok_or_else(|| missing(SWAP_ADDRESSES))?;
            let mut matched = Vec::new();
            for (_, value) in addresses.records() {
                let info = SwapAddressInfo::from_json(value)?;
                if predicate(&info) {
                    matched.push(info);
                }
            }
            Ok(matched)
        })
    }

    /// Delete the record for `address`. Deleting an unknown address is a no-op.
    pub fn remove_swap_address(&self, address: &str) -> WalletDbResult<()> {
        self.store.update(|tx| {
            let mut addresses = tx.namespace_mut(SWAP_ADDRESSES).ok_or_else(|| missing(SWAP_ADDRESSES))?;
            addresses.delete(address.as_bytes())?;
            Ok(())
        })
    }

    /// Delete the first record, in address order, whose payment hash equals `hash`.
    ///
    /// Returns whether a record was removed. Scanning stops at the first
    /// match, so further records carrying the same hash are kept.
    pub fn remove_swap_address_by_payment_hash(&self, hash: &[u8]) -> WalletDbResult<bool> {
        self.store.update(|tx| {
            let mut addresses = tx.namespace_mut(SWAP_ADDRESSES).ok_or_else(|| missing(SWAP_ADDRESSES))?;

            let mut found = None;
            for (key, value) in addresses.records() {
                if SwapAddressInfo::from_json(value)?.payment_hash == hash {
                    found = Some(key.to_vec());
                    break;
                }
            }

            match found {
                Some(key) => {
                    addresses.delete(&key)?;
                    debug!(address = %String::from_utf8_lossy(&key), "Removed swap address by payment hash");
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Decode the record for `address`, let `mutate` edit it, and write it
    /// back under the same key, all in one transaction.
    pub fn update_swap_address_info<F>(&self, address: &str, mutate: F) -> WalletDbResult<()>
    where
        F: FnOnce(&mut SwapAddressInfo),
    {
        self.store.update(|tx| {
            let mut addresses = tx.namespace_mut(SWAP_ADDRESSES).ok_or_else(|| missing(SWAP_ADDRESSES))?;
            let stored = addresses
                .get(address.as_bytes())
                .ok_or_else(|| WalletDbError::SwapAddressNotFound(address.to_string()))?;
            let mut info = SwapAddressInfo::from_json(stored)?;
            mutate(&mut info);
            addresses.put(address.as_bytes(), &info.to_json()?)?;
            Ok(())
        })
    }
}
