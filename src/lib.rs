//! Client for the Soldrive access directory: derives account addresses,
//! builds and submits file and sharing requests, and reconciles ledger scans
//! into owned / shared-with-me / shared-by-me views.

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod services;
pub mod utils;
pub mod wallet;

pub use error::{DirectoryError, Result};
pub use ledger::{Ledger, LedgerError, MemoryLedger};
pub use models::{AccessLevel, Address, FileRecord, FileStatus, SharedAccessGrant};
pub use services::{AccessDirectory, ClientSettings, Dashboard, Mutation, TxOutcome};
pub use wallet::Wallet;
