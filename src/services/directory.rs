//! Access directory client: builds and submits ledger requests for the
//! connected wallet and reconciles ledger scans into dashboard views.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::error::{DirectoryError, Result};
use crate::ledger::{instruction, AccountFilter, Instruction, Ledger, LedgerError, Transaction, TxId};
use crate::models::{AccessLevel, Account, Address, FileRecord, FileStatus, GlobalConfig, SharedAccessGrant, UserProfile};
use crate::services::pending::{OpClass, PendingGuard, PendingOps};
use crate::services::views::{self, FileEntry, Parent, SharedEntry};
use crate::utils::pda;
use crate::wallet::Wallet;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Upper bound on waiting for a confirmed change to show up in reads.
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    pub rpc_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(250),
            rpc_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed(TxId),
    /// The ledger had already applied this exact transaction. Only reported
    /// once the expected state has been read back.
    AlreadyProcessed(TxId),
}

impl TxOutcome {
    pub fn tx_id(&self) -> &TxId {
        match self {
            TxOutcome::Confirmed(id) | TxOutcome::AlreadyProcessed(id) => id,
        }
    }

    pub fn is_already_processed(&self) -> bool {
        matches!(self, TxOutcome::AlreadyProcessed(_))
    }
}

/// A confirmed mutation together with the record as the ledger reports it
/// afterwards.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub outcome: TxOutcome,
    pub state: T,
}

pub struct AccessDirectory<L: Ledger> {
    ledger: Arc<L>,
    program_id: Address,
    wallet: Option<Wallet>,
    pending: PendingOps,
    settings: ClientSettings,
}

pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty() {
        return Err(DirectoryError::InvalidInput("file name is empty".into()));
    }
    if file_name.len() > pda::MAX_SEED_LEN {
        return Err(DirectoryError::InvalidInput(format!(
            "file name longer than {} bytes",
            pda::MAX_SEED_LEN
        )));
    }
    if file_name.contains('/') {
        return Err(DirectoryError::InvalidInput("file name contains '/'".into()));
    }
    Ok(())
}

/// A rejection caused by another client creating the config or profile
/// between our read and our submission.
fn is_setup_conflict(error: &DirectoryError) -> bool {
    match error {
        DirectoryError::TransactionFailed(msg) => {
            msg.contains("GlobalConfig already initialized") || msg.contains("UserProfile already initialized")
        }
        _ => false,
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

impl<L: Ledger> AccessDirectory<L> {
    pub fn new(ledger: Arc<L>, program_id: Address, settings: ClientSettings) -> Self {
        Self { ledger, program_id, wallet: None, pending: PendingOps::new(), settings }
    }

    /// Shares an existing pending set, e.g. between a directory and a view
    /// that needs to show which rows are busy.
    pub fn with_pending(mut self, pending: PendingOps) -> Self {
        self.pending = pending;
        self
    }

    pub fn connect(&mut self, wallet: Wallet) -> Address {
        let address = wallet.address();
        info!("wallet connected: {}", address);
        self.wallet = Some(wallet);
        address
    }

    pub fn disconnect(&mut self) -> Option<Address> {
        let address = self.wallet.take().map(|w| w.address());
        if let Some(a) = &address {
            info!("wallet disconnected: {}", a);
        }
        address
    }

    pub fn identity(&self) -> Result<Address> {
        self.wallet().map(Wallet::address)
    }

    fn wallet(&self) -> Result<&Wallet> {
        self.wallet.as_ref().ok_or(DirectoryError::NotConnected)
    }

    pub fn program_id(&self) -> Address {
        self.program_id
    }

    pub fn pending(&self) -> &PendingOps {
        &self.pending
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn file_address(&self, owner: &Address, file_name: &str) -> Address {
        pda::file_address(&self.program_id, owner, file_name)
    }

    pub fn share_address(&self, file: &Address, grantee: &Address) -> Address {
        pda::share_address(&self.program_id, file, grantee)
    }

    // ---- reads ---------------------------------------------------------

    async fn with_retry<T, F, Fut>(&self, what: &str, call: F) -> std::result::Result<T, LedgerError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, LedgerError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(LedgerError::RateLimited) if attempt < self.settings.rpc_retries => {
                    attempt += 1;
                    warn!("{}: rate limited, retry {}/{}", what, attempt, self.settings.rpc_retries);
                    sleep(self.settings.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn fetch_account<T: Account + Send>(&self, address: &Address) -> Result<Option<T>> {
        let data = self
            .with_retry("getAccountInfo", || self.ledger.get_account(address))
            .await?;
        match data {
            Some(bytes) => T::from_account_data(&bytes)
                .map(Some)
                .map_err(|source| DirectoryError::Decode { address: *address, source }),
            None => Ok(None),
        }
    }

    async fn scan(&self, filters: &[AccountFilter]) -> Result<Vec<(Address, Vec<u8>)>> {
        let program_id = self.program_id;
        Ok(self
            .with_retry("getProgramAccounts", || self.ledger.get_program_accounts(&program_id, filters))
            .await?)
    }

    pub async fn fetch_file(&self, owner: &Address, file_name: &str) -> Result<Option<FileRecord>> {
        self.fetch_account(&self.file_address(owner, file_name)).await
    }

    pub async fn fetch_grant(&self, file: &Address, grantee: &Address) -> Result<Option<SharedAccessGrant>> {
        self.fetch_account(&self.share_address(file, grantee)).await
    }

    /// Loads the caller's record for `file_name`.
    async fn owned_record(&self, owner: &Address, file_name: &str) -> Result<(Address, FileRecord)> {
        let address = self.file_address(owner, file_name);
        let record: FileRecord = self
            .fetch_account(&address)
            .await?
            .ok_or(DirectoryError::NotFound { what: "file record", address })?;
        if record.owner != *owner {
            return Err(DirectoryError::NotOwner { file_name: file_name.to_string() });
        }
        Ok((address, record))
    }

    // ---- submission ----------------------------------------------------

    async fn submit(&self, instructions: Vec<Instruction>) -> Result<TxOutcome> {
        let wallet = self.wallet()?;
        let names: Vec<&str> = instructions.iter().map(|ix| ix.data.name()).collect();
        let names = names.join(",");

        let blockhash = self
            .with_retry("getLatestBlockhash", || self.ledger.latest_blockhash())
            .await?;
        let tx = Transaction::new_signed(wallet, blockhash, instructions)
            .map_err(|e| DirectoryError::TransactionFailed(format!("encode transaction: {}", e)))?;
        let tx_id = tx.id();
        info!("submitting {} [{}]", tx_id, names);

        let mut attempt = 0;
        loop {
            match self.ledger.send_transaction(&tx).await {
                Ok(id) => {
                    self.with_retry("confirmTransaction", || self.ledger.confirm_transaction(&id))
                        .await?;
                    info!("confirmed {} [{}]", id, names);
                    return Ok(TxOutcome::Confirmed(id));
                }
                Err(LedgerError::AlreadyProcessed) => {
                    info!("{} [{}] was already processed", tx_id, names);
                    return Ok(TxOutcome::AlreadyProcessed(tx_id));
                }
                Err(LedgerError::RateLimited) if attempt < self.settings.rpc_retries => {
                    attempt += 1;
                    warn!("send {}: rate limited, retry {}/{}", tx_id, attempt, self.settings.rpc_retries);
                    sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(e) => {
                    warn!("{} [{}] failed: {}", tx_id, names, e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Polls `address` until `expected` holds or the settle timeout passes.
    async fn settle<T, P>(&self, address: Address, expected: P) -> Result<T>
    where
        T: Account + Send,
        P: Fn(&T) -> bool + Send,
    {
        let deadline = Instant::now() + self.settings.settle_timeout;
        loop {
            if let Some(value) = self.fetch_account::<T>(&address).await? {
                if expected(&value) {
                    return Ok(value);
                }
            }
            if Instant::now() >= deadline {
                return Err(DirectoryError::NotSettled { address });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Reads back the effect of a submitted transaction. An already-processed
    /// resubmission counts as success only when the expected state is there.
    async fn finish<T, P>(&self, outcome: TxOutcome, address: Address, expected: P) -> Result<Mutation<T>>
    where
        T: Account + Send,
        P: Fn(&T) -> bool + Send,
    {
        match self.settle(address, expected).await {
            Ok(state) => Ok(Mutation { outcome, state }),
            Err(DirectoryError::NotSettled { .. }) if outcome.is_already_processed() => {
                Err(DirectoryError::TransactionFailed(format!(
                    "{} reported as already processed but {} does not reflect it",
                    outcome.tx_id(),
                    address
                )))
            }
            Err(e) => Err(e),
        }
    }

    // ---- mutations -----------------------------------------------------

    pub async fn create_file(
        &self,
        file_name: &str,
        file_size: u64,
        content_hash: [u8; 32],
        chunk_count: u32,
    ) -> Result<Mutation<FileRecord>> {
        validate_file_name(file_name)?;
        if file_size == 0 {
            return Err(DirectoryError::InvalidInput("file size must be greater than zero".into()));
        }
        if chunk_count == 0 {
            return Err(DirectoryError::InvalidInput("chunk count must be greater than zero".into()));
        }
        let owner = self.identity()?;
        let address = self.file_address(&owner, file_name);
        let _guard = self.pending.begin(OpClass::Lifecycle, address)?;

        if self.fetch_account::<FileRecord>(&address).await?.is_some() {
            return Err(DirectoryError::NameInUse(file_name.to_string()));
        }

        let create = instruction::create_file(
            &self.program_id,
            &owner,
            file_name,
            file_size,
            content_hash,
            chunk_count,
        );
        let mut setup = self.setup_instructions(&owner).await?;
        let _setup_guard = if setup.is_empty() {
            None
        } else {
            // one owner's account setup runs one at a time
            let profile = pda::profile_address(&self.program_id, &owner);
            let guard = self.wait_pending(OpClass::Setup, profile).await;
            setup = self.setup_instructions(&owner).await?;
            Some(guard)
        };

        let with_setup = !setup.is_empty();
        let mut instructions = setup;
        instructions.push(create.clone());
        let outcome = match self.submit(instructions).await {
            Err(e) if with_setup && is_setup_conflict(&e) => {
                warn!("account setup raced another client ({}), resubmitting", e);
                let mut instructions = self.setup_instructions(&owner).await?;
                instructions.push(create);
                self.submit(instructions).await?
            }
            other => other?,
        };
        self.finish(outcome, address, |r: &FileRecord| {
            r.owner == owner && r.content_hash == content_hash && r.file_size == file_size
        })
        .await
    }

    /// Instructions creating whichever of the global config and the owner's
    /// profile do not exist yet.
    async fn setup_instructions(&self, owner: &Address) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();
        let config = pda::config_address(&self.program_id);
        if self.fetch_account::<GlobalConfig>(&config).await?.is_none() {
            debug!("global config missing, initializing");
            instructions.push(instruction::initialize(&self.program_id, owner));
        }
        let profile = pda::profile_address(&self.program_id, owner);
        if self.fetch_account::<UserProfile>(&profile).await?.is_none() {
            debug!("profile for {} missing, creating", owner);
            instructions.push(instruction::create_user_profile(&self.program_id, owner));
        }
        Ok(instructions)
    }

    /// Like `PendingOps::begin`, but waits for the current holder instead of
    /// failing.
    async fn wait_pending(&self, class: OpClass, target: Address) -> PendingGuard {
        loop {
            if let Ok(guard) = self.pending.begin(class, target) {
                return guard;
            }
            debug!("waiting for pending {} on {}", class.as_str(), target);
            sleep(self.settings.poll_interval).await;
        }
    }

    pub async fn register_storage(
        &self,
        file_name: &str,
        primary_cid: &str,
        merkle_root: [u8; 32],
    ) -> Result<Mutation<FileRecord>> {
        validate_file_name(file_name)?;
        if primary_cid.trim().is_empty() {
            return Err(DirectoryError::InvalidInput("content id is empty".into()));
        }
        let owner = self.identity()?;
        let address = self.file_address(&owner, file_name);
        let _guard = self.pending.begin(OpClass::Lifecycle, address)?;
        self.owned_record(&owner, file_name).await?;

        let ix = instruction::register_storage(&self.program_id, &owner, file_name, primary_cid, merkle_root);
        let outcome = self.submit(vec![ix]).await?;
        self.finish(outcome, address, |r: &FileRecord| {
            r.primary_cid.as_deref() == Some(primary_cid) && r.status != FileStatus::Uploading
        })
        .await
    }

    pub async fn finalize_file(&self, file_name: &str) -> Result<Mutation<FileRecord>> {
        validate_file_name(file_name)?;
        let owner = self.identity()?;
        let address = self.file_address(&owner, file_name);
        let _guard = self.pending.begin(OpClass::Lifecycle, address)?;
        self.owned_record(&owner, file_name).await?;

        let ix = instruction::finalize_file(&self.program_id, &owner, file_name);
        let outcome = self.submit(vec![ix]).await?;
        self.finish(outcome, address, |r: &FileRecord| r.status == FileStatus::Active)
            .await
    }

    pub async fn make_public(&self, file_name: &str) -> Result<Mutation<FileRecord>> {
        self.set_visibility(file_name, true).await
    }

    pub async fn make_private(&self, file_name: &str) -> Result<Mutation<FileRecord>> {
        self.set_visibility(file_name, false).await
    }

    async fn set_visibility(&self, file_name: &str, is_public: bool) -> Result<Mutation<FileRecord>> {
        validate_file_name(file_name)?;
        let owner = self.identity()?;
        let address = self.file_address(&owner, file_name);
        let _guard = self.pending.begin(OpClass::Visibility, address)?;
        self.owned_record(&owner, file_name).await?;

        let ix = if is_public {
            instruction::make_public(&self.program_id, &owner, file_name)
        } else {
            instruction::make_private(&self.program_id, &owner, file_name)
        };
        let outcome = self.submit(vec![ix]).await?;
        self.finish(outcome, address, |r: &FileRecord| r.is_public == is_public)
            .await
    }

    fn parse_grantee(&self, owner: &Address, grantee: &str) -> Result<Address> {
        let grantee: Address = grantee
            .parse()
            .map_err(|e| DirectoryError::InvalidInput(format!("grantee '{}': {}", grantee, e)))?;
        if grantee == *owner {
            return Err(DirectoryError::InvalidInput("cannot share a file with its owner".into()));
        }
        Ok(grantee)
    }

    pub async fn grant_access(
        &self,
        file_name: &str,
        grantee: &str,
        access_level: AccessLevel,
        expires_at: Option<i64>,
    ) -> Result<Mutation<SharedAccessGrant>> {
        validate_file_name(file_name)?;
        let owner = self.identity()?;
        let grantee = self.parse_grantee(&owner, grantee)?;
        if let Some(t) = expires_at {
            if t <= now() {
                return Err(DirectoryError::InvalidInput("expiry must be in the future".into()));
            }
        }
        let file = self.file_address(&owner, file_name);
        let share = self.share_address(&file, &grantee);
        let _guard = self.pending.begin(OpClass::Access, share)?;
        self.owned_record(&owner, file_name).await?;

        let ix = instruction::grant_access(&self.program_id, &owner, file_name, &grantee, access_level, expires_at);
        let outcome = self.submit(vec![ix]).await?;
        self.finish(outcome, share, |g: &SharedAccessGrant| {
            g.is_active && g.access_level == access_level && g.expires_at == expires_at
        })
        .await
    }

    pub async fn revoke_access(&self, file_name: &str, grantee: &str) -> Result<Mutation<SharedAccessGrant>> {
        validate_file_name(file_name)?;
        let owner = self.identity()?;
        let grantee = self.parse_grantee(&owner, grantee)?;
        let file = self.file_address(&owner, file_name);
        let share = self.share_address(&file, &grantee);
        let _guard = self.pending.begin(OpClass::Access, share)?;
        if self.fetch_account::<SharedAccessGrant>(&share).await?.is_none() {
            return Err(DirectoryError::NotFound { what: "access grant", address: share });
        }

        let ix = instruction::revoke_access(&self.program_id, &owner, file_name, &grantee);
        let outcome = self.submit(vec![ix]).await?;
        self.finish(outcome, share, |g: &SharedAccessGrant| !g.is_active).await
    }

    // ---- views ---------------------------------------------------------

    pub async fn list_owned_files(&self) -> Result<Vec<FileEntry>> {
        let owner = self.identity()?;
        let raw = self
            .scan(&[
                AccountFilter::of_type::<FileRecord>(),
                AccountFilter::address_at(FileRecord::OWNER_OFFSET, &owner),
            ])
            .await?;
        Ok(views::owned_files(raw, &owner))
    }

    pub async fn list_shared_with_me(&self) -> Result<Vec<SharedEntry>> {
        let me = self.identity()?;
        self.list_grants(SharedAccessGrant::GRANTEE_OFFSET, &me).await
    }

    pub async fn list_shared_by_me(&self) -> Result<Vec<SharedEntry>> {
        let me = self.identity()?;
        self.list_grants(SharedAccessGrant::GRANTOR_OFFSET, &me).await
    }

    async fn list_grants(&self, offset: usize, identity: &Address) -> Result<Vec<SharedEntry>> {
        let raw = self
            .scan(&[
                AccountFilter::of_type::<SharedAccessGrant>(),
                AccountFilter::address_at(offset, identity),
            ])
            .await?;
        let grants = views::live_grants(raw, now());

        let parents: HashSet<Address> = grants.iter().map(|(_, g)| g.file).collect();
        let lookups = join_all(parents.into_iter().map(|file| async move {
            let parent = match self.fetch_account::<FileRecord>(&file).await {
                Ok(Some(record)) => Parent::Found(record),
                Ok(None) => Parent::Missing,
                Err(e) => {
                    warn!("could not load file {} for shared entry: {}", file, e);
                    Parent::Unavailable
                }
            };
            (file, parent)
        }))
        .await;
        let parents: HashMap<Address, Parent> = lookups.into_iter().collect();

        Ok(views::join_parents(grants, &parents))
    }
}
