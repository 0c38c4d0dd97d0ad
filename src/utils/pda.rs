//! Derived account addresses.
//!
//! Every address is `sha256(len ++ seed, ... , program_id, PDA_MARKER)`, so the
//! client can compute where an account lives before it exists on the ledger.

use sha2::{Digest, Sha256};

use crate::models::Address;

const PDA_MARKER: &[u8] = b"soldrive:pda";

pub const FILE_SEED: &[u8] = b"file";
pub const SHARED_ACCESS_SEED: &[u8] = b"shared_access";
pub const USER_PROFILE_SEED: &[u8] = b"user_profile";
pub const CONFIG_SEED: &[u8] = b"config";

/// Longest file name accepted as a seed.
pub const MAX_SEED_LEN: usize = 32;

pub fn derive_address(seeds: &[&[u8]], program_id: &Address) -> Address {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update((seed.len() as u32).to_le_bytes());
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    Address(hasher.finalize().into())
}

pub fn file_address(program_id: &Address, owner: &Address, file_name: &str) -> Address {
    derive_address(&[FILE_SEED, owner.as_bytes(), file_name.as_bytes()], program_id)
}

pub fn share_address(program_id: &Address, file: &Address, grantee: &Address) -> Address {
    derive_address(&[SHARED_ACCESS_SEED, file.as_bytes(), grantee.as_bytes()], program_id)
}

pub fn profile_address(program_id: &Address, owner: &Address) -> Address {
    derive_address(&[USER_PROFILE_SEED, owner.as_bytes()], program_id)
}

pub fn config_address(program_id: &Address) -> Address {
    derive_address(&[CONFIG_SEED], program_id)
}
