//! Boundary to the external ledger program.
//!
//! The program owns every durable record and enforces every rule; this
//! module only describes what the client sends (signed transactions carrying
//! program instructions) and how it reads (account fetch and filtered scans).

use std::fmt;

use async_trait::async_trait;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{Account, Address};
use crate::wallet::{self, Wallet};

pub mod instruction;
pub mod memory;
pub mod program;
pub mod rpc;

pub use instruction::{Instruction, InstructionData};
pub use memory::MemoryLedger;
pub use rpc::JsonRpcLedger;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("rate limited by ledger node")]
    RateLimited,
    #[error("transaction already processed")]
    AlreadyProcessed,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("transaction {0} not confirmed")]
    Unconfirmed(TxId),
}

/// Recent block hash a transaction is bound to. A transaction signed against
/// a stale hash is rejected, and an identical resubmission is detected as
/// already processed.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blockhash(pub [u8; 32]);

impl Blockhash {
    pub fn for_slot(slot: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"blockhash");
        hasher.update(slot.to_le_bytes());
        Blockhash(hasher.finalize().into())
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", self)
    }
}

/// Transaction id: base58 of the transaction signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub signer: Address,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub message: Message,
    pub signature: Signature,
}

impl Transaction {
    pub fn new_signed(
        wallet: &Wallet,
        recent_blockhash: Blockhash,
        instructions: Vec<Instruction>,
    ) -> Result<Self, bincode::Error> {
        let message = Message { signer: wallet.address(), recent_blockhash, instructions };
        let signature = wallet.sign(&bincode::serialize(&message)?);
        Ok(Transaction { message, signature })
    }

    pub fn id(&self) -> TxId {
        TxId(bs58::encode(self.signature.to_bytes()).into_string())
    }

    pub fn verify(&self) -> bool {
        match bincode::serialize(&self.message) {
            Ok(bytes) => wallet::verify(&self.message.signer, &bytes, &self.signature),
            Err(_) => false,
        }
    }
}

/// Byte-level match against account data, evaluated by the ledger node
/// during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    /// Matches accounts of type `T`.
    pub fn of_type<T: Account>() -> Self {
        AccountFilter::Memcmp { offset: 0, bytes: T::discriminator().to_vec() }
    }

    pub fn address_at(offset: usize, address: &Address) -> Self {
        AccountFilter::Memcmp { offset, bytes: address.as_bytes().to_vec() }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .map_or(false, |window| window == bytes.as_slice()),
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError>;

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Address, Vec<u8>)>, LedgerError>;

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError>;

    async fn send_transaction(&self, tx: &Transaction) -> Result<TxId, LedgerError>;

    /// Waits until `id` is confirmed or reports why it is not.
    async fn confirm_transaction(&self, id: &TxId) -> Result<(), LedgerError>;
}
