//! Paystore Core — embedded transactional record store
//!
//! A single-file store of named namespaces holding byte-keyed records,
//! with nested namespaces and a per-namespace sequence counter.
//!
//! # Architecture
//!
//! - **Read path**: view transactions read an immutable snapshot (`Arc<State>`)
//! - **Write path**: one update transaction at a time, committed as a single
//!   checksummed entry appended to the store file, then published
//! - **Recovery**: replay intact entries on open, truncate a torn tail,
//!   refuse a file damaged anywhere before its last entry
//! - **Compaction**: rewrite the file as one snapshot entry when dead space grows
//!
//! One process owns a store file at a time; a second open fails with
//! `StoreError::Locked`.

pub mod compaction;
pub mod config;
mod durability;
pub mod error;
pub mod format;
mod lock;
pub mod log;
pub mod state;
pub mod store;
pub mod tx;

// Re-export key types for convenience
pub use compaction::CompactionResult;
pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use state::{Entry, Iter, NamespaceId};
pub use store::{Store, StoreStats};
pub use tx::{Namespace, NamespaceMut, UpdateTx, ViewTx};
