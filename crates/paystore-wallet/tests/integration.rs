//! Integration tests: the wallet database end to end.
//!
//! These tests open real store files in a temp directory and go through
//! the `WalletDb` facade, including close/reopen cycles and damaged files.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::TempDir;

use paystore_core::{Config, StoreError};
use paystore_wallet::{SwapAddressInfo, SyncInfo, WalletDb, WalletDbError, WalletDbResult};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_db() -> (WalletDb, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = WalletDb::open(dir.path().join("wallet.db"), Config::default()).unwrap();
    (db, dir)
}

fn swap(address: &str, hash: &[u8]) -> SwapAddressInfo {
    SwapAddressInfo { address: address.to_string(), payment_hash: hash.to_vec(), ..Default::default() }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

// ---------------------------------------------------------------------------
// Payment ledger
// ---------------------------------------------------------------------------

#[test]
fn test_payments_in_insertion_order() {
    let (db, _dir) = test_db();
    let payments = db.payments();
    for i in 0..10u8 {
        payments.add_payment(&[i], 0, 0).unwrap();
    }

    let all = payments.fetch_all_payments().unwrap();
    assert_eq!(all.len(), 10);
    for (i, record) in all.iter().enumerate() {
        assert_eq!(record, &vec![i as u8]);
    }
}

#[test]
fn test_sync_info_running_max() {
    let (db, _dir) = test_db();
    let payments = db.payments();
    assert_eq!(payments.fetch_sync_info().unwrap(), SyncInfo::default());

    payments.add_payment(b"A", 5, 100).unwrap();
    payments.add_payment(b"B", 3, 50).unwrap();
    assert_eq!(
        payments.fetch_sync_info().unwrap(),
        SyncInfo { last_sent_payment_time: 100, last_settled_index: 5 }
    );

    payments.add_payment(b"C", 9, 0).unwrap();
    assert_eq!(
        payments.fetch_sync_info().unwrap(),
        SyncInfo { last_sent_payment_time: 100, last_settled_index: 9 }
    );
}

#[test]
fn test_sequence_continues_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");

    let db = WalletDb::open(&path, Config::default()).unwrap();
    db.payments().add_payment(b"one", 1, 10).unwrap();
    db.payments().add_payment(b"two", 2, 20).unwrap();
    db.close().unwrap();

    let db = WalletDb::open(&path, Config::default()).unwrap();
    assert_eq!(db.payments().add_payment(b"three", 3, 30).unwrap(), 3);
    assert_eq!(
        db.payments().fetch_all_payments().unwrap(),
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
    assert_eq!(
        db.payments().fetch_sync_info().unwrap(),
        SyncInfo { last_sent_payment_time: 30, last_settled_index: 3 }
    );
}

// ---------------------------------------------------------------------------
// Account and payment requests
// ---------------------------------------------------------------------------

#[test]
fn test_account_and_requests() {
    let (db, _dir) = test_db();
    db.account().save_account(b"X").unwrap();
    db.account().save_account(b"Y").unwrap();
    assert_eq!(db.account().fetch_account().unwrap(), Some(b"Y".to_vec()));

    db.payment_requests().save_payment_request("h1", b"R").unwrap();
    assert_eq!(db.payment_requests().fetch_payment_request("h1").unwrap(), Some(b"R".to_vec()));
    assert_eq!(db.payment_requests().fetch_payment_request("h2").unwrap(), None);
}

// ---------------------------------------------------------------------------
// Swap addresses
// ---------------------------------------------------------------------------

#[test]
fn test_swap_address_lifecycle() {
    let (db, _dir) = test_db();
    let swaps = db.swap_addresses();

    swaps.save_swap_address(&swap("a1", b"h1")).unwrap();
    assert_eq!(swaps.fetch_all_swap_addresses().unwrap(), vec![swap("a1", b"h1")]);

    swaps.update_swap_address_info("a1", |info| info.paid_amount = 1_000).unwrap();
    let funded = swaps.fetch_swap_addresses(|info| info.paid_amount > 0).unwrap();
    assert_eq!(funded.len(), 1);

    assert!(swaps.remove_swap_address_by_payment_hash(b"h1").unwrap());
    assert!(swaps.fetch_all_swap_addresses().unwrap().is_empty());
    assert!(!swaps.remove_swap_address_by_payment_hash(b"h1").unwrap());

    swaps.remove_swap_address("nonexistent").unwrap();
}

#[test]
fn test_swap_record_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");
    let info = SwapAddressInfo {
        address: "2N8hwP1WmJrFF5QWABn38y63uYLhnJYJYTF".into(),
        creation_timestamp: 1_546_300_800,
        payment_hash: vec![1; 32],
        preimage: vec![2; 32],
        private_key: vec![3; 32],
        public_key: vec![4; 33],
        script: vec![5; 70],
        payment_request: "lnbc1...".into(),
        confirmed_amount: 20_000,
        confirmed_transaction_ids: vec!["ab".repeat(32)],
        paid_amount: 19_000,
        lock_height: 288,
        error_message: String::new(),
        entered_mempool: true,
    };

    let db = WalletDb::open(&path, Config::default()).unwrap();
    db.swap_addresses().save_swap_address(&info).unwrap();
    db.close().unwrap();

    let db = WalletDb::open(&path, Config::default()).unwrap();
    assert_eq!(db.swap_addresses().fetch_all_swap_addresses().unwrap(), vec![info]);
}

// ---------------------------------------------------------------------------
// Transactions and file handling
// ---------------------------------------------------------------------------

#[test]
fn test_failed_update_leaves_no_trace() {
    let (db, _dir) = test_db();
    db.account().save_account(b"kept").unwrap();
    let before = db.store().stats();

    let result: WalletDbResult<()> = db.store().update(|tx| {
        tx.namespace_mut(b"account").unwrap().put(b"account", b"lost")?;
        Err(WalletDbError::SwapAddressNotFound("abort".into()))
    });
    assert!(result.is_err());

    assert_eq!(db.account().fetch_account().unwrap(), Some(b"kept".to_vec()));
    assert_eq!(db.store().stats(), before);
    assert_eq!(file_len(db.path()), before.file_bytes);
}

#[cfg(unix)]
#[test]
fn test_second_open_is_locked() {
    let (db, _dir) = test_db();
    let second = WalletDb::open(db.path(), Config::default());
    assert!(matches!(second, Err(WalletDbError::Store(StoreError::Locked { .. }))));

    let path = db.path().to_path_buf();
    db.close().unwrap();
    WalletDb::open(&path, Config::default()).unwrap();
}

#[test]
fn test_torn_tail_truncated_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");

    let db = WalletDb::open(&path, Config::default()).unwrap();
    db.payments().add_payment(b"durable", 1, 1).unwrap();
    db.close().unwrap();
    let good_len = file_len(&path);

    // Simulate a crash partway through the next append
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"PSTX\x40\x00\x00\x00garbage").unwrap();
    drop(file);

    let db = WalletDb::open(&path, Config::default()).unwrap();
    assert_eq!(file_len(&path), good_len);
    assert_eq!(db.payments().fetch_all_payments().unwrap(), vec![b"durable".to_vec()]);
    assert_eq!(db.payments().add_payment(b"next", 2, 2).unwrap(), 2);
}

#[test]
fn test_damaged_payment_before_later_commits_is_corrupted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");

    let db = WalletDb::open(&path, Config::default()).unwrap();
    db.payments().add_payment(b"first", 1, 1).unwrap();
    let second_start = file_len(&path);
    db.payments().add_payment(b"second", 2, 2).unwrap();
    db.payments().add_payment(b"third", 3, 3).unwrap();
    db.close().unwrap();

    // First payload byte of the second payment's entry
    let mut data = std::fs::read(&path).unwrap();
    data[second_start as usize + 32] ^= 0xFF;
    std::fs::write(&path, &data).unwrap();

    match WalletDb::open(&path, Config::default()) {
        Err(err) => assert!(err.is_corruption(), "unexpected error: {err}"),
        Ok(_) => panic!("store with a damaged commit before intact ones must not open"),
    }
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_bad_header_is_corrupted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");
    WalletDb::open(&path, Config::default()).unwrap().close().unwrap();

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(b"XXXX").unwrap();
    drop(file);

    let result = WalletDb::open(&path, Config::default());
    match result {
        Err(err) => assert!(err.is_corruption(), "unexpected error: {err}"),
        Ok(_) => panic!("damaged header must not open"),
    }
}

#[test]
fn test_compaction_preserves_contents_and_sequence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");

    let db = WalletDb::open(&path, Config::default()).unwrap();
    for i in 0..40u64 {
        db.account().save_account(&i.to_be_bytes()).unwrap();
    }
    db.payments().add_payment(b"p1", 4, 40).unwrap();
    db.swap_addresses().save_swap_address(&swap("a1", b"h1")).unwrap();

    let before = file_len(&path);
    let result = db.compact().unwrap();
    assert_eq!(result.original_bytes, before);
    assert!(file_len(&path) < before);
    db.close().unwrap();

    let db = WalletDb::open(&path, Config::default()).unwrap();
    assert_eq!(db.account().fetch_account().unwrap(), Some(39u64.to_be_bytes().to_vec()));
    assert_eq!(db.payments().add_payment(b"p2", 0, 0).unwrap(), 2);
    assert_eq!(
        db.payments().fetch_sync_info().unwrap(),
        SyncInfo { last_sent_payment_time: 40, last_settled_index: 4 }
    );
    assert_eq!(db.swap_addresses().fetch_all_swap_addresses().unwrap(), vec![swap("a1", b"h1")]);
}

#[cfg(unix)]
#[test]
fn test_store_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (db, _dir) = test_db();
    let mode = std::fs::metadata(db.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
