use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod file;
pub mod profile;
pub mod share;

pub use file::{FileRecord, FileStatus};
pub use profile::{GlobalConfig, UserProfile};
pub use share::{AccessLevel, SharedAccessGrant};

/// Length of the type tag prepended to every account's data.
pub const DISCRIMINATOR_LEN: usize = 8;

/// A 32-byte ledger address: a wallet public key, a program id or a derived
/// account address. Displayed and parsed as base58.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Address whose bytes are the sha256 of `label`. Used for fixed,
    /// well-known ids such as the default program id.
    pub fn from_label(label: &str) -> Self {
        Address(Sha256::digest(label.as_bytes()).into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid base58: {0}")]
    InvalidBase58(String),
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| AddressParseError::InvalidBase58(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Address(arr))
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account data truncated ({0} bytes)")]
    Truncated(usize),
    #[error("account is not a {expected}")]
    WrongType { expected: &'static str },
    #[error("account codec: {0}")]
    Codec(#[from] bincode::Error),
}

/// On-ledger account layout: an 8-byte discriminator followed by the
/// bincode encoding of the fields.
pub trait Account: Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        let digest = Sha256::digest(format!("account:{}", Self::NAME).as_bytes());
        let mut out = [0u8; DISCRIMINATOR_LEN];
        out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
        out
    }

    fn to_account_data(&self) -> Result<Vec<u8>, AccountError> {
        let mut data = Self::discriminator().to_vec();
        data.extend(bincode::serialize(self)?);
        Ok(data)
    }

    fn from_account_data(data: &[u8]) -> Result<Self, AccountError> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(AccountError::Truncated(data.len()));
        }
        if data[..DISCRIMINATOR_LEN] != Self::discriminator() {
            return Err(AccountError::WrongType { expected: Self::NAME });
        }
        Ok(bincode::deserialize(&data[DISCRIMINATOR_LEN..])?)
    }
}
