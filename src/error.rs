use thiserror::Error;

use crate::ledger::LedgerError;
use crate::models::{AccountError, Address};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("{what} not found at {address}")]
    NotFound { what: &'static str, address: Address },

    #[error("file '{file_name}' is not owned by the connected wallet")]
    NotOwner { file_name: String },

    #[error("file name '{0}' already in use")]
    NameInUse(String),

    #[error("file '{0}' is already uploaded")]
    AlreadyUploaded(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} already in progress for {target}")]
    AlreadyInProgress { operation: &'static str, target: Address },

    #[error("rate limited by ledger node")]
    RateLimited,

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("ledger did not reflect the change at {address} in time")]
    NotSettled { address: Address },

    #[error("malformed account {address}: {source}")]
    Decode { address: Address, source: AccountError },
}

impl From<LedgerError> for DirectoryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::RateLimited => DirectoryError::RateLimited,
            other => DirectoryError::TransactionFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
