//! Paystore Wallet — payment-wallet records over Paystore Core
//!
//! Maps a wallet's persistent state onto store namespaces:
//!
//! - **payments**: opaque payment records under a persisted sequence,
//!   plus monotone sync watermarks in the nested `paymentsSyncInfo`
//! - **account**: a single account blob
//! - **paymentRequests**: incoming payment requests keyed by hash
//! - **swap_addresses**: JSON swap address records keyed by address
//!
//! `WalletDb` owns the store and hands out borrowing component views.
//! Record contents other than swap addresses are opaque to this crate.

pub mod accessors;
pub mod account;
pub mod db;
pub mod error;
pub mod namespaces;
pub mod payment_requests;
pub mod payments;
pub mod swap;

pub use account::AccountStore;
pub use db::WalletDb;
pub use error::{WalletDbError, WalletDbResult};
pub use payment_requests::PaymentRequests;
pub use payments::{PaymentLedger, SyncInfo};
pub use swap::{SwapAddressInfo, SwapAddressRegistry};
