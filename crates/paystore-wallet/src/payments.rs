//! Payment ledger: sequence-keyed payment records plus sync watermarks.
//!
//! Each payment is stored under the 8-byte big-endian value of the
//! `payments` sequence counter, so record order is insertion order. The
//! nested `paymentsSyncInfo` namespace holds two watermarks that only move
//! forward: the latest sent-payment time and the latest settled invoice
//! index. A record and its watermark updates commit as one transaction.

use paystore_core::{NamespaceMut, Store};
use tracing::debug;

use crate::error::{WalletDbError, WalletDbResult};
use crate::namespaces::{missing, LAST_SENT_PAYMENT_TIME, LAST_SETTLED_INDEX, PAYMENTS, PAYMENTS_SYNC_INFO};

/// Sync watermarks. Both are 0 until the first payment raises them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncInfo {
    pub last_sent_payment_time: i64,
    pub last_settled_index: u64,
}

/// Payment ledger over a borrowed store.
#[derive(Debug, Clone, Copy)]
pub struct PaymentLedger<'a> {
    store: &'a Store,
}

impl<'a> PaymentLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Append a payment record and merge the watermarks, atomically.
    ///
    /// Each watermark is raised only when the candidate is strictly greater
    /// than the stored value; pass 0 for a watermark that does not apply.
    /// Returns the sequence number the record was stored under.
    pub fn add_payment(&self, record: &[u8], received_index: u64, sent_time: u64) -> WalletDbResult<u64> {
        self.store.update(|tx| {
            let mut payments = tx.namespace_mut(PAYMENTS).ok_or_else(|| missing(PAYMENTS))?;
            let id = payments.next_sequence()?;
            payments.put(&id.to_be_bytes(), record)?;

            let mut sync = payments
                .into_namespace_mut(PAYMENTS_SYNC_INFO)
                .ok_or_else(|| missing(PAYMENTS_SYNC_INFO))?;
            raise_watermark(&mut sync, LAST_SENT_PAYMENT_TIME, sent_time)?;
            raise_watermark(&mut sync, LAST_SETTLED_INDEX, received_index)?;

            debug!(id, received_index, sent_time, "Added payment");
            Ok(id)
        })
    }

    /// Every payment record in insertion order.
    pub fn fetch_all_payments(&self) -> WalletDbResult<Vec<Vec<u8>>> {
        self.store.view(|tx| {
            let payments = tx.namespace(PAYMENTS).ok_or_else(|| missing(PAYMENTS))?;
            Ok(payments.records().map(|(_, value)| value.to_vec()).collect())
        })
    }

    /// Current watermarks; `(0, 0)` when no payment has been added.
    pub fn fetch_sync_info(&self) -> WalletDbResult<SyncInfo> {
        self.store.view(|tx| {
            let sync = tx
                .namespace(PAYMENTS)
                .ok_or_else(|| missing(PAYMENTS))?
                .namespace(PAYMENTS_SYNC_INFO)
                .ok_or_else(|| missing(PAYMENTS_SYNC_INFO))?;
            Ok(SyncInfo {
                last_sent_payment_time: decode_watermark(LAST_SENT_PAYMENT_TIME, sync.get(LAST_SENT_PAYMENT_TIME))?
                    as i64,
                last_settled_index: decode_watermark(LAST_SETTLED_INDEX, sync.get(LAST_SETTLED_INDEX))?,
            })
        })
    }

    /// Number of payment records.
    pub fn payment_count(&self) -> WalletDbResult<usize> {
        self.store.view(|tx| {
            let payments = tx.namespace(PAYMENTS).ok_or_else(|| missing(PAYMENTS))?;
            Ok(payments.records().count())
        })
    }
}

/// Absent is 0; anything but 8 bytes is malformed.
fn decode_watermark(key: &[u8], value: Option<&[u8]>) -> WalletDbResult<u64> {
    let Some(bytes) = value else {
        return Ok(0);
    };
    let raw: [u8; 8] = bytes.try_into().map_err(|_| WalletDbError::MalformedWatermark {
        key: String::from_utf8_lossy(key).into_owned(),
        len: bytes.len(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn raise_watermark(sync: &mut NamespaceMut<'_>, key: &[u8], candidate: u64) -> WalletDbResult<()> {
    let current = decode_watermark(key, sync.get(key))?;
    if candidate > current {
        sync.put(key, &candidate.to_be_bytes())?;
    }
    Ok(())
}
