//! In-process ledger: executes transactions against an account map with the
//! program rules from [`super::program`]. Used as the external program's
//! stand-in in tests and as the CLI fallback when no RPC endpoint is set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;

use super::program::{self, Accounts};
use super::{AccountFilter, Blockhash, Ledger, LedgerError, Transaction, TxId};
use crate::models::Address;

/// Number of recent block hashes a transaction may reference.
const MAX_RECENT_BLOCKHASHES: usize = 150;

#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<MemoryLedgerInner>,
}

struct MemoryLedgerInner {
    program_id: Address,
    accounts: RwLock<Accounts>,
    chain: RwLock<Chain>,
}

struct Chain {
    slot: u64,
    recent: VecDeque<Blockhash>,
    processed: HashSet<TxId>,
    log: Vec<TxId>,
}

impl Chain {
    fn advance(&mut self) {
        self.slot += 1;
        self.recent.push_back(Blockhash::for_slot(self.slot));
        while self.recent.len() > MAX_RECENT_BLOCKHASHES {
            self.recent.pop_front();
        }
    }
}

impl MemoryLedger {
    pub fn new(program_id: Address) -> Self {
        let mut recent = VecDeque::new();
        recent.push_back(Blockhash::for_slot(0));
        Self {
            inner: Arc::new(MemoryLedgerInner {
                program_id,
                accounts: RwLock::new(HashMap::new()),
                chain: RwLock::new(Chain { slot: 0, recent, processed: HashSet::new(), log: Vec::new() }),
            }),
        }
    }

    pub fn program_id(&self) -> Address {
        self.inner.program_id
    }

    /// Writes raw account data, bypassing the program. Models state written
    /// by other clients or by earlier program versions.
    pub fn put_account(&self, address: Address, data: Vec<u8>) {
        self.inner.accounts.write().insert(address, data);
    }

    pub fn remove_account(&self, address: &Address) -> Option<Vec<u8>> {
        self.inner.accounts.write().remove(address)
    }

    pub fn account_count(&self) -> usize {
        self.inner.accounts.read().len()
    }

    /// Ids of successfully processed transactions, oldest first.
    pub fn processed_transactions(&self) -> Vec<TxId> {
        self.inner.chain.read().log.clone()
    }

    pub fn slot(&self) -> u64 {
        self.inner.chain.read().slot
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.inner.accounts.read().get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Address, Vec<u8>)>, LedgerError> {
        if *program_id != self.inner.program_id {
            return Ok(Vec::new());
        }
        let accounts = self.inner.accounts.read();
        // HashMap iteration order leaks through on purpose: callers must not
        // rely on scan ordering.
        let matches = accounts
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| f.matches(data)))
            .map(|(address, data)| (*address, data.clone()))
            .collect();
        Ok(matches)
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let chain = self.inner.chain.read();
        Ok(Blockhash::for_slot(chain.slot))
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<TxId, LedgerError> {
        if !tx.verify() {
            return Err(LedgerError::Rejected("signature verification failed".to_string()));
        }
        let id = tx.id();

        let mut chain = self.inner.chain.write();
        if chain.processed.contains(&id) {
            debug!("duplicate submission of {}", id);
            return Err(LedgerError::AlreadyProcessed);
        }
        if !chain.recent.contains(&tx.message.recent_blockhash) {
            return Err(LedgerError::Rejected("blockhash not found".to_string()));
        }

        // Stage every instruction on a copy so a failing instruction leaves
        // no partial writes behind.
        let mut accounts = self.inner.accounts.write();
        let mut staged = accounts.clone();
        let now = Utc::now().timestamp();
        for (index, ix) in tx.message.instructions.iter().enumerate() {
            if let Err(e) = program::execute(&mut staged, &self.inner.program_id, &tx.message.signer, ix, now) {
                warn!("transaction {} failed at instruction {} ({}): {}", id, index, ix.data.name(), e);
                return Err(LedgerError::Rejected(format!(
                    "instruction {} ({}): {}",
                    index,
                    ix.data.name(),
                    e
                )));
            }
        }
        *accounts = staged;

        chain.processed.insert(id.clone());
        chain.log.push(id.clone());
        chain.advance();
        debug!("processed {} at slot {}", id, chain.slot);
        Ok(id)
    }

    async fn confirm_transaction(&self, id: &TxId) -> Result<(), LedgerError> {
        if self.inner.chain.read().processed.contains(id) {
            Ok(())
        } else {
            Err(LedgerError::Unconfirmed(id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::instruction as ix;
    use crate::models::{Account, FileRecord};
    use crate::utils::pda;
    use crate::wallet::Wallet;

    async fn signed(ledger: &MemoryLedger, wallet: &Wallet, ixs: Vec<crate::ledger::Instruction>) -> Transaction {
        let hash = ledger.latest_blockhash().await.unwrap();
        Transaction::new_signed(wallet, hash, ixs).unwrap()
    }

    fn bootstrap(program: &Address, owner: &Address) -> Vec<crate::ledger::Instruction> {
        vec![ix::initialize(program, owner), ix::create_user_profile(program, owner)]
    }

    #[tokio::test]
    async fn resubmission_reports_already_processed() {
        let program = Address::from_label("program");
        let ledger = MemoryLedger::new(program);
        let wallet = Wallet::from_secret([5u8; 32]);
        let tx = signed(&ledger, &wallet, bootstrap(&program, &wallet.address())).await;

        let id = ledger.send_transaction(&tx).await.unwrap();
        ledger.confirm_transaction(&id).await.unwrap();
        assert_eq!(ledger.send_transaction(&tx).await, Err(LedgerError::AlreadyProcessed));
        assert_eq!(ledger.processed_transactions(), vec![id]);
        assert_eq!(ledger.slot(), 1);
    }

    #[tokio::test]
    async fn failing_instruction_rolls_back_whole_transaction() {
        let program = Address::from_label("program");
        let ledger = MemoryLedger::new(program);
        let wallet = Wallet::from_secret([5u8; 32]);
        let owner = wallet.address();
        let mut ixs = bootstrap(&program, &owner);
        ixs.push(ix::finalize_file(&program, &owner, "missing.txt"));
        let tx = signed(&ledger, &wallet, ixs).await;

        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(msg) if msg.contains("finalizeFile")));
        assert_eq!(ledger.account_count(), 0);
        assert!(ledger.confirm_transaction(&tx.id()).await.is_err());
    }

    #[tokio::test]
    async fn tampered_transaction_rejected() {
        let program = Address::from_label("program");
        let ledger = MemoryLedger::new(program);
        let wallet = Wallet::from_secret([5u8; 32]);
        let mut tx = signed(&ledger, &wallet, bootstrap(&program, &wallet.address())).await;
        tx.message.signer = Wallet::from_secret([6u8; 32]).address();
        assert!(matches!(ledger.send_transaction(&tx).await, Err(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn unknown_blockhash_rejected() {
        let program = Address::from_label("program");
        let ledger = MemoryLedger::new(program);
        let wallet = Wallet::from_secret([5u8; 32]);
        let tx = Transaction::new_signed(&wallet, Blockhash::for_slot(999), bootstrap(&program, &wallet.address()))
            .unwrap();
        assert!(matches!(ledger.send_transaction(&tx).await, Err(LedgerError::Rejected(m)) if m.contains("blockhash")));
    }

    #[tokio::test]
    async fn scans_apply_all_filters() {
        let program = Address::from_label("program");
        let ledger = MemoryLedger::new(program);
        let alice = Wallet::from_secret([1u8; 32]);
        let bob = Wallet::from_secret([2u8; 32]);

        let mut ixs = bootstrap(&program, &alice.address());
        ixs.push(ix::create_file(&program, &alice.address(), "a.txt", 5, [0; 32], 1));
        let tx = signed(&ledger, &alice, ixs).await;
        ledger.send_transaction(&tx).await.unwrap();

        let ixs = vec![
            ix::create_user_profile(&program, &bob.address()),
            ix::create_file(&program, &bob.address(), "b.txt", 5, [0; 32], 1),
        ];
        let tx = signed(&ledger, &bob, ixs).await;
        ledger.send_transaction(&tx).await.unwrap();

        let filters = [
            AccountFilter::of_type::<FileRecord>(),
            AccountFilter::address_at(FileRecord::OWNER_OFFSET, &bob.address()),
        ];
        let found = ledger.get_program_accounts(&program, &filters).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, pda::file_address(&program, &bob.address(), "b.txt"));
        let record = FileRecord::from_account_data(&found[0].1).unwrap();
        assert_eq!(record.file_name, "b.txt");

        let other = ledger.get_program_accounts(&Address::from_label("x"), &filters).await.unwrap();
        assert!(other.is_empty());
    }
}
