#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use soldrive::ledger::{AccountFilter, Blockhash, Ledger, LedgerError, MemoryLedger, Transaction, TxId};
use soldrive::models::Address;
use soldrive::services::{AccessDirectory, ClientSettings};
use soldrive::wallet::Wallet;

pub fn program_id() -> Address {
    Address::from_label("soldrive-test-program")
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        settle_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        rpc_retries: 2,
        retry_backoff: Duration::from_millis(1),
    }
}

pub fn wallet(seed: u8) -> Wallet {
    Wallet::from_secret([seed; 32])
}

pub fn connected<L: Ledger>(ledger: &Arc<L>, seed: u8) -> AccessDirectory<L> {
    let mut directory = AccessDirectory::new(Arc::clone(ledger), program_id(), settings());
    directory.connect(wallet(seed));
    directory
}

pub fn memory_ledger() -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new(program_id()))
}

pub const HASH: [u8; 32] = [0xab; 32];
pub const ROOT: [u8; 32] = [0xcd; 32];

/// Holds submissions and scans until permits are released while gated.
pub struct GatedLedger {
    pub inner: MemoryLedger,
    pub gated: AtomicBool,
    pub permits: Semaphore,
    pub sends: AtomicUsize,
    pub scans: AtomicUsize,
}

impl GatedLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            gated: AtomicBool::new(false),
            permits: Semaphore::new(0),
            sends: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
        }
    }

    async fn wait_gate(&self) -> Result<(), LedgerError> {
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| LedgerError::Transport(e.to_string()))?;
            permit.forget();
        }
        Ok(())
    }

    pub fn release(&self, n: usize) {
        self.gated.store(false, Ordering::SeqCst);
        self.permits.add_permits(n);
    }
}

#[async_trait]
impl Ledger for GatedLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        self.inner.get_account(address).await
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Address, Vec<u8>)>, LedgerError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await?;
        self.inner.get_program_accounts(program_id, filters).await
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        self.inner.latest_blockhash().await
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<TxId, LedgerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await?;
        self.inner.send_transaction(tx).await
    }

    async fn confirm_transaction(&self, id: &TxId) -> Result<(), LedgerError> {
        self.inner.confirm_transaction(id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Normal,
    /// Applies the next transaction, then answers as if rate limited.
    ApplyThenRateLimit,
    /// Claims every transaction was already processed without applying it.
    ClaimProcessed,
    AlwaysRateLimited,
    /// Applies the next `n` transactions, then behaves as `AlwaysRateLimited`.
    RateLimitAfter(usize),
}

/// Misbehaving node: scripted send responses and unreadable accounts.
pub struct FlakyLedger {
    pub inner: MemoryLedger,
    pub mode: Mutex<SendMode>,
    pub unreadable: Mutex<HashSet<Address>>,
    pub sends: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            mode: Mutex::new(SendMode::Normal),
            unreadable: Mutex::new(HashSet::new()),
            sends: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: SendMode) {
        *self.mode.lock() = mode;
    }

    pub fn fail_reads_of(&self, address: Address) {
        self.unreadable.lock().insert(address);
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        if self.unreadable.lock().contains(address) {
            return Err(LedgerError::Transport("connection reset".into()));
        }
        self.inner.get_account(address).await
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Address, Vec<u8>)>, LedgerError> {
        self.inner.get_program_accounts(program_id, filters).await
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        self.inner.latest_blockhash().await
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<TxId, LedgerError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock();
        match mode {
            SendMode::Normal => self.inner.send_transaction(tx).await,
            SendMode::ApplyThenRateLimit => {
                self.set_mode(SendMode::Normal);
                self.inner.send_transaction(tx).await?;
                Err(LedgerError::RateLimited)
            }
            SendMode::ClaimProcessed => Err(LedgerError::AlreadyProcessed),
            SendMode::AlwaysRateLimited | SendMode::RateLimitAfter(0) => Err(LedgerError::RateLimited),
            SendMode::RateLimitAfter(n) => {
                self.set_mode(SendMode::RateLimitAfter(n - 1));
                self.inner.send_transaction(tx).await
            }
        }
    }

    async fn confirm_transaction(&self, id: &TxId) -> Result<(), LedgerError> {
        self.inner.confirm_transaction(id).await
    }
}
