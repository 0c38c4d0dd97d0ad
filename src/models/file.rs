use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Account, Address, DISCRIMINATOR_LEN};

/// Upload lifecycle of a file record. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Uploading,
    Processing,
    Active,
}

impl FileStatus {
    pub fn can_advance_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Uploading, FileStatus::Processing) | (FileStatus::Processing, FileStatus::Active)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploading => "uploading",
            FileStatus::Processing => "processing",
            FileStatus::Active => "active",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub owner: Address,
    pub file_name: String,
    pub file_size: u64,
    pub content_hash: [u8; 32],
    pub chunk_count: u32,
    pub created_at: i64,
    pub primary_cid: Option<String>,
    pub merkle_root: Option<[u8; 32]>,
    pub status: FileStatus,
    pub is_public: bool,
}

impl FileRecord {
    /// Byte offset of `owner` within the account data.
    pub const OWNER_OFFSET: usize = DISCRIMINATOR_LEN;

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

impl Account for FileRecord {
    const NAME: &'static str = "FileRecord";
}
