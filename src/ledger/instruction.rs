//! Instruction set of the ledger program and builders that attach the
//! derived accounts each instruction touches.
//!
//! Account order per instruction:
//!
//! | instruction          | accounts                          |
//! |----------------------|-----------------------------------|
//! | `Initialize`         | config, authority                 |
//! | `CreateUserProfile`  | profile, owner                    |
//! | `CreateFile`         | file, profile, config, owner      |
//! | `RegisterStorage`    | file, owner                       |
//! | `FinalizeFile`       | file, owner                       |
//! | `MakePublic/Private` | file, owner                       |
//! | `GrantAccess`        | share, file, owner                |
//! | `RevokeAccess`       | share, file, owner                |

use serde::{Deserialize, Serialize};

use crate::models::{AccessLevel, Address};
use crate::utils::pda;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionData {
    Initialize,
    CreateUserProfile,
    CreateFile {
        file_name: String,
        file_size: u64,
        content_hash: [u8; 32],
        chunk_count: u32,
    },
    RegisterStorage {
        file_name: String,
        primary_cid: String,
        merkle_root: [u8; 32],
    },
    FinalizeFile {
        file_name: String,
    },
    MakePublic {
        file_name: String,
    },
    MakePrivate {
        file_name: String,
    },
    GrantAccess {
        file_name: String,
        grantee: Address,
        access_level: AccessLevel,
        expires_at: Option<i64>,
    },
    RevokeAccess {
        file_name: String,
        grantee: Address,
    },
}

impl InstructionData {
    pub fn name(&self) -> &'static str {
        match self {
            InstructionData::Initialize => "initialize",
            InstructionData::CreateUserProfile => "createUserProfile",
            InstructionData::CreateFile { .. } => "createFile",
            InstructionData::RegisterStorage { .. } => "registerStorage",
            InstructionData::FinalizeFile { .. } => "finalizeFile",
            InstructionData::MakePublic { .. } => "makePublic",
            InstructionData::MakePrivate { .. } => "makePrivate",
            InstructionData::GrantAccess { .. } => "grantAccess",
            InstructionData::RevokeAccess { .. } => "revokeAccess",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<Address>,
    pub data: InstructionData,
}

pub fn initialize(program_id: &Address, authority: &Address) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![pda::config_address(program_id), *authority],
        data: InstructionData::Initialize,
    }
}

pub fn create_user_profile(program_id: &Address, owner: &Address) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![pda::profile_address(program_id, owner), *owner],
        data: InstructionData::CreateUserProfile,
    }
}

pub fn create_file(
    program_id: &Address,
    owner: &Address,
    file_name: &str,
    file_size: u64,
    content_hash: [u8; 32],
    chunk_count: u32,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            pda::file_address(program_id, owner, file_name),
            pda::profile_address(program_id, owner),
            pda::config_address(program_id),
            *owner,
        ],
        data: InstructionData::CreateFile {
            file_name: file_name.to_string(),
            file_size,
            content_hash,
            chunk_count,
        },
    }
}

fn file_instruction(program_id: &Address, owner: &Address, file_name: &str, data: InstructionData) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![pda::file_address(program_id, owner, file_name), *owner],
        data,
    }
}

pub fn register_storage(
    program_id: &Address,
    owner: &Address,
    file_name: &str,
    primary_cid: &str,
    merkle_root: [u8; 32],
) -> Instruction {
    file_instruction(
        program_id,
        owner,
        file_name,
        InstructionData::RegisterStorage {
            file_name: file_name.to_string(),
            primary_cid: primary_cid.to_string(),
            merkle_root,
        },
    )
}

pub fn finalize_file(program_id: &Address, owner: &Address, file_name: &str) -> Instruction {
    file_instruction(
        program_id,
        owner,
        file_name,
        InstructionData::FinalizeFile { file_name: file_name.to_string() },
    )
}

pub fn make_public(program_id: &Address, owner: &Address, file_name: &str) -> Instruction {
    file_instruction(
        program_id,
        owner,
        file_name,
        InstructionData::MakePublic { file_name: file_name.to_string() },
    )
}

pub fn make_private(program_id: &Address, owner: &Address, file_name: &str) -> Instruction {
    file_instruction(
        program_id,
        owner,
        file_name,
        InstructionData::MakePrivate { file_name: file_name.to_string() },
    )
}

fn share_accounts(program_id: &Address, owner: &Address, file_name: &str, grantee: &Address) -> Vec<Address> {
    let file = pda::file_address(program_id, owner, file_name);
    vec![pda::share_address(program_id, &file, grantee), file, *owner]
}

pub fn grant_access(
    program_id: &Address,
    owner: &Address,
    file_name: &str,
    grantee: &Address,
    access_level: AccessLevel,
    expires_at: Option<i64>,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: share_accounts(program_id, owner, file_name, grantee),
        data: InstructionData::GrantAccess {
            file_name: file_name.to_string(),
            grantee: *grantee,
            access_level,
            expires_at,
        },
    }
}

pub fn revoke_access(program_id: &Address, owner: &Address, file_name: &str, grantee: &Address) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: share_accounts(program_id, owner, file_name, grantee),
        data: InstructionData::RevokeAccess {
            file_name: file_name.to_string(),
            grantee: *grantee,
        },
    }
}
