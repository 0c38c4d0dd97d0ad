use serde::{Deserialize, Serialize};

use super::{Account, Address, DISCRIMINATOR_LEN};

/// Per-owner bookkeeping, created on the owner's first upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub owner: Address,
    pub file_count: u64,
    pub storage_used: u64,
    pub created_at: i64,
}

impl UserProfile {
    pub const OWNER_OFFSET: usize = DISCRIMINATOR_LEN;
}

impl Account for UserProfile {
    const NAME: &'static str = "UserProfile";
}

/// Program-wide singleton.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    pub authority: Address,
    pub total_files: u64,
    pub total_storage: u64,
}

impl Account for GlobalConfig {
    const NAME: &'static str = "GlobalConfig";
}
