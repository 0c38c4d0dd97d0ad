//! Rules the client assumes of the ledger program, executed against a plain
//! account map. `MemoryLedger` runs transactions through [`execute`].

use std::collections::HashMap;

use thiserror::Error;

use super::instruction::{Instruction, InstructionData};
use crate::models::{
    AccessLevel, Account, AccountError, Address, FileRecord, FileStatus, GlobalConfig, SharedAccessGrant,
    UserProfile,
};
use crate::utils::pda;

pub type Accounts = HashMap<Address, Vec<u8>>;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("instruction targets unknown program {0}")]
    UnknownProgram(Address),
    #[error("account #{index} does not match derived address")]
    AccountMismatch { index: usize },
    #[error("{0} already initialized")]
    AlreadyInitialized(&'static str),
    #[error("{0} not found")]
    AccountNotFound(&'static str),
    #[error("signer does not own this file")]
    Unauthorized,
    #[error("invalid status transition {from} -> {to}")]
    InvalidStatus { from: FileStatus, to: FileStatus },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Account(#[from] AccountError),
}

pub fn execute(
    accounts: &mut Accounts,
    program_id: &Address,
    signer: &Address,
    ix: &Instruction,
    now: i64,
) -> Result<(), ProgramError> {
    if ix.program_id != *program_id {
        return Err(ProgramError::UnknownProgram(ix.program_id));
    }
    let mut ctx = Context { accounts, program_id, signer, ix, now };
    match &ix.data {
        InstructionData::Initialize => ctx.initialize(),
        InstructionData::CreateUserProfile => ctx.create_user_profile(),
        InstructionData::CreateFile { file_name, file_size, content_hash, chunk_count } => {
            ctx.create_file(file_name, *file_size, *content_hash, *chunk_count)
        }
        InstructionData::RegisterStorage { file_name, primary_cid, merkle_root } => {
            ctx.register_storage(file_name, primary_cid, *merkle_root)
        }
        InstructionData::FinalizeFile { file_name } => ctx.finalize_file(file_name),
        InstructionData::MakePublic { file_name } => ctx.set_visibility(file_name, true),
        InstructionData::MakePrivate { file_name } => ctx.set_visibility(file_name, false),
        InstructionData::GrantAccess { file_name, grantee, access_level, expires_at } => {
            ctx.grant_access(file_name, grantee, *access_level, *expires_at)
        }
        InstructionData::RevokeAccess { file_name, grantee } => ctx.revoke_access(file_name, grantee),
    }
}

struct Context<'a> {
    accounts: &'a mut Accounts,
    program_id: &'a Address,
    signer: &'a Address,
    ix: &'a Instruction,
    now: i64,
}

impl<'a> Context<'a> {
    fn expect_accounts(&self, expected: &[Address]) -> Result<(), ProgramError> {
        if self.ix.accounts.len() != expected.len() {
            return Err(ProgramError::AccountMismatch { index: self.ix.accounts.len().min(expected.len()) });
        }
        for (index, (given, want)) in self.ix.accounts.iter().zip(expected).enumerate() {
            if given != want {
                return Err(ProgramError::AccountMismatch { index });
            }
        }
        Ok(())
    }

    fn load<T: Account>(&self, address: &Address) -> Result<Option<T>, ProgramError> {
        match self.accounts.get(address) {
            Some(data) => Ok(Some(T::from_account_data(data)?)),
            None => Ok(None),
        }
    }

    fn store<T: Account>(&mut self, address: Address, value: &T) -> Result<(), ProgramError> {
        self.accounts.insert(address, value.to_account_data()?);
        Ok(())
    }

    fn owned_file(&self, file_name: &str) -> Result<(Address, FileRecord), ProgramError> {
        let address = pda::file_address(self.program_id, self.signer, file_name);
        let record: FileRecord = self
            .load(&address)?
            .ok_or(ProgramError::AccountNotFound("FileRecord"))?;
        if record.owner != *self.signer {
            return Err(ProgramError::Unauthorized);
        }
        Ok((address, record))
    }

    fn initialize(&mut self) -> Result<(), ProgramError> {
        let config = pda::config_address(self.program_id);
        self.expect_accounts(&[config, *self.signer])?;
        if self.accounts.contains_key(&config) {
            return Err(ProgramError::AlreadyInitialized("GlobalConfig"));
        }
        let value = GlobalConfig { authority: *self.signer, total_files: 0, total_storage: 0 };
        self.store(config, &value)
    }

    fn create_user_profile(&mut self) -> Result<(), ProgramError> {
        let profile = pda::profile_address(self.program_id, self.signer);
        self.expect_accounts(&[profile, *self.signer])?;
        if self.accounts.contains_key(&profile) {
            return Err(ProgramError::AlreadyInitialized("UserProfile"));
        }
        let value = UserProfile { owner: *self.signer, file_count: 0, storage_used: 0, created_at: self.now };
        self.store(profile, &value)
    }

    fn create_file(
        &mut self,
        file_name: &str,
        file_size: u64,
        content_hash: [u8; 32],
        chunk_count: u32,
    ) -> Result<(), ProgramError> {
        if file_name.is_empty() || file_name.len() > pda::MAX_SEED_LEN {
            return Err(ProgramError::InvalidArgument("file name length"));
        }
        if file_size == 0 {
            return Err(ProgramError::InvalidArgument("file size"));
        }
        if chunk_count == 0 {
            return Err(ProgramError::InvalidArgument("chunk count"));
        }
        let file = pda::file_address(self.program_id, self.signer, file_name);
        let profile_addr = pda::profile_address(self.program_id, self.signer);
        let config_addr = pda::config_address(self.program_id);
        self.expect_accounts(&[file, profile_addr, config_addr, *self.signer])?;

        let mut profile: UserProfile = self
            .load(&profile_addr)?
            .ok_or(ProgramError::AccountNotFound("UserProfile"))?;
        let mut config: GlobalConfig = self
            .load(&config_addr)?
            .ok_or(ProgramError::AccountNotFound("GlobalConfig"))?;
        if self.accounts.contains_key(&file) {
            return Err(ProgramError::AlreadyInitialized("FileRecord"));
        }

        let record = FileRecord {
            owner: *self.signer,
            file_name: file_name.to_string(),
            file_size,
            content_hash,
            chunk_count,
            created_at: self.now,
            primary_cid: None,
            merkle_root: None,
            status: FileStatus::Uploading,
            is_public: false,
        };
        profile.file_count += 1;
        profile.storage_used = profile.storage_used.saturating_add(file_size);
        config.total_files += 1;
        config.total_storage = config.total_storage.saturating_add(file_size);

        self.store(file, &record)?;
        self.store(profile_addr, &profile)?;
        self.store(config_addr, &config)
    }

    fn advance(&mut self, file_name: &str, to: FileStatus) -> Result<(Address, FileRecord), ProgramError> {
        let (address, mut record) = self.owned_file(file_name)?;
        self.expect_accounts(&[address, *self.signer])?;
        if !record.status.can_advance_to(to) {
            return Err(ProgramError::InvalidStatus { from: record.status, to });
        }
        record.status = to;
        Ok((address, record))
    }

    fn register_storage(&mut self, file_name: &str, primary_cid: &str, merkle_root: [u8; 32]) -> Result<(), ProgramError> {
        if primary_cid.trim().is_empty() {
            return Err(ProgramError::InvalidArgument("content id"));
        }
        let (address, mut record) = self.advance(file_name, FileStatus::Processing)?;
        record.primary_cid = Some(primary_cid.to_string());
        record.merkle_root = Some(merkle_root);
        self.store(address, &record)
    }

    fn finalize_file(&mut self, file_name: &str) -> Result<(), ProgramError> {
        let (address, record) = self.advance(file_name, FileStatus::Active)?;
        self.store(address, &record)
    }

    fn set_visibility(&mut self, file_name: &str, is_public: bool) -> Result<(), ProgramError> {
        let (address, mut record) = self.owned_file(file_name)?;
        self.expect_accounts(&[address, *self.signer])?;
        if record.is_public == is_public {
            return Ok(());
        }
        record.is_public = is_public;
        self.store(address, &record)
    }

    fn grant_access(
        &mut self,
        file_name: &str,
        grantee: &Address,
        access_level: AccessLevel,
        expires_at: Option<i64>,
    ) -> Result<(), ProgramError> {
        let (file, _) = self.owned_file(file_name)?;
        let share = pda::share_address(self.program_id, &file, grantee);
        self.expect_accounts(&[share, file, *self.signer])?;
        if grantee == self.signer {
            return Err(ProgramError::InvalidArgument("grantee is the owner"));
        }
        if matches!(expires_at, Some(t) if t <= self.now) {
            return Err(ProgramError::InvalidArgument("expiry in the past"));
        }
        let grant = match self.load::<SharedAccessGrant>(&share)? {
            Some(mut existing) => {
                existing.access_level = access_level;
                existing.expires_at = expires_at;
                existing.is_active = true;
                existing.granted_at = self.now;
                existing
            }
            None => SharedAccessGrant {
                file,
                grantee: *grantee,
                grantor: *self.signer,
                access_level,
                expires_at,
                is_active: true,
                granted_at: self.now,
            },
        };
        self.store(share, &grant)
    }

    fn revoke_access(&mut self, file_name: &str, grantee: &Address) -> Result<(), ProgramError> {
        let (file, _) = self.owned_file(file_name)?;
        let share = pda::share_address(self.program_id, &file, grantee);
        self.expect_accounts(&[share, file, *self.signer])?;
        let mut grant: SharedAccessGrant = self
            .load(&share)?
            .ok_or(ProgramError::AccountNotFound("SharedAccessGrant"))?;
        grant.is_active = false;
        self.store(share, &grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::instruction as ix;

    const NOW: i64 = 1_700_000_000;

    fn setup() -> (Accounts, Address, Address) {
        let program = Address::from_label("program");
        let owner = Address::from_label("alice");
        let mut accounts = Accounts::new();
        execute(&mut accounts, &program, &owner, &ix::initialize(&program, &owner), NOW).unwrap();
        execute(&mut accounts, &program, &owner, &ix::create_user_profile(&program, &owner), NOW).unwrap();
        (accounts, program, owner)
    }

    fn file(accounts: &Accounts, program: &Address, owner: &Address, name: &str) -> FileRecord {
        let data = &accounts[&pda::file_address(program, owner, name)];
        FileRecord::from_account_data(data).unwrap()
    }

    #[test]
    fn create_requires_profile() {
        let program = Address::from_label("program");
        let owner = Address::from_label("alice");
        let mut accounts = Accounts::new();
        execute(&mut accounts, &program, &owner, &ix::initialize(&program, &owner), NOW).unwrap();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        let err = execute(&mut accounts, &program, &owner, &create, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::AccountNotFound("UserProfile")));
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let (mut accounts, program, owner) = setup();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();

        let finalize = ix::finalize_file(&program, &owner, "a.txt");
        let err = execute(&mut accounts, &program, &owner, &finalize, NOW).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::InvalidStatus { from: FileStatus::Uploading, to: FileStatus::Active }
        ));

        let register = ix::register_storage(&program, &owner, "a.txt", "bafyabc", [1; 32]);
        execute(&mut accounts, &program, &owner, &register, NOW).unwrap();
        execute(&mut accounts, &program, &owner, &finalize, NOW).unwrap();
        assert_eq!(file(&accounts, &program, &owner, "a.txt").status, FileStatus::Active);

        let err = execute(&mut accounts, &program, &owner, &register, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::InvalidStatus { from: FileStatus::Active, .. }));
    }

    #[test]
    fn duplicate_name_rejected_and_profile_counts() {
        let (mut accounts, program, owner) = setup();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();
        let err = execute(&mut accounts, &program, &owner, &create, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::AlreadyInitialized("FileRecord")));

        let profile = UserProfile::from_account_data(&accounts[&pda::profile_address(&program, &owner)]).unwrap();
        assert_eq!(profile.file_count, 1);
        assert_eq!(profile.storage_used, 10);
    }

    #[test]
    fn only_owner_may_mutate() {
        let (mut accounts, program, owner) = setup();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();

        // Mallory signs an instruction built with alice's derived accounts.
        let mallory = Address::from_label("mallory");
        let forged = ix::make_public(&program, &owner, "a.txt");
        let err = execute(&mut accounts, &program, &mallory, &forged, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::AccountNotFound("FileRecord")));
    }

    #[test]
    fn visibility_toggle_is_idempotent() {
        let (mut accounts, program, owner) = setup();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();
        let public = ix::make_public(&program, &owner, "a.txt");
        execute(&mut accounts, &program, &owner, &public, NOW).unwrap();
        let before = accounts.clone();
        execute(&mut accounts, &program, &owner, &public, NOW).unwrap();
        assert_eq!(before, accounts);
        assert!(file(&accounts, &program, &owner, "a.txt").is_public);
    }

    #[test]
    fn grant_reactivates_and_revoke_requires_grant() {
        let (mut accounts, program, owner) = setup();
        let bob = Address::from_label("bob");
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();

        let revoke = ix::revoke_access(&program, &owner, "a.txt", &bob);
        let err = execute(&mut accounts, &program, &owner, &revoke, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::AccountNotFound("SharedAccessGrant")));

        let grant = ix::grant_access(&program, &owner, "a.txt", &bob, AccessLevel::Read, None);
        execute(&mut accounts, &program, &owner, &grant, NOW).unwrap();
        execute(&mut accounts, &program, &owner, &revoke, NOW).unwrap();
        let upgrade = ix::grant_access(&program, &owner, "a.txt", &bob, AccessLevel::Write, Some(NOW + 60));
        execute(&mut accounts, &program, &owner, &upgrade, NOW + 1).unwrap();

        let file_addr = pda::file_address(&program, &owner, "a.txt");
        let share = pda::share_address(&program, &file_addr, &bob);
        let g = SharedAccessGrant::from_account_data(&accounts[&share]).unwrap();
        assert!(g.is_active);
        assert_eq!(g.access_level, AccessLevel::Write);
        assert_eq!(g.expires_at, Some(NOW + 60));
        assert_eq!(g.grantor, owner);
    }

    #[test]
    fn grant_rejects_past_expiry_and_self() {
        let (mut accounts, program, owner) = setup();
        let create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        execute(&mut accounts, &program, &owner, &create, NOW).unwrap();
        let bob = Address::from_label("bob");
        let stale = ix::grant_access(&program, &owner, "a.txt", &bob, AccessLevel::Read, Some(NOW));
        assert!(matches!(
            execute(&mut accounts, &program, &owner, &stale, NOW),
            Err(ProgramError::InvalidArgument(_))
        ));
        let own = ix::grant_access(&program, &owner, "a.txt", &owner, AccessLevel::Read, None);
        assert!(matches!(
            execute(&mut accounts, &program, &owner, &own, NOW),
            Err(ProgramError::InvalidArgument(_))
        ));
    }

    #[test]
    fn mismatched_accounts_rejected() {
        let (mut accounts, program, owner) = setup();
        let mut create = ix::create_file(&program, &owner, "a.txt", 10, [0; 32], 1);
        create.accounts[0] = Address::from_label("elsewhere");
        let err = execute(&mut accounts, &program, &owner, &create, NOW).unwrap_err();
        assert!(matches!(err, ProgramError::AccountMismatch { index: 0 }));
    }
}
