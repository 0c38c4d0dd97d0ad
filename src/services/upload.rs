//! Local preparation of a file before it is registered on the ledger.

use sha2::{Digest, Sha256};

use crate::error::{DirectoryError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1MB

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadManifest {
    pub file_size: u64,
    pub content_hash: [u8; 32],
    pub chunk_count: u32,
    pub merkle_root: [u8; 32],
}

impl UploadManifest {
    pub fn from_bytes(data: &[u8], chunk_size: usize) -> Result<Self> {
        let chunk_size = chunk_size.max(1);
        let chunk_count = chunk_count(data.len(), chunk_size)?;
        let leaves: Vec<[u8; 32]> = if data.is_empty() {
            vec![Sha256::digest(b"").into()]
        } else {
            data.chunks(chunk_size).map(|chunk| Sha256::digest(chunk).into()).collect()
        };
        Ok(UploadManifest {
            file_size: data.len() as u64,
            content_hash: Sha256::digest(data).into(),
            chunk_count,
            merkle_root: merkle_root(&leaves),
        })
    }
}

/// Number of `chunk_size` chunks covering `len` bytes; an empty file is one
/// chunk. Fails when the count does not fit the record's `u32` field.
pub fn chunk_count(len: usize, chunk_size: usize) -> Result<u32> {
    let chunks = len.div_ceil(chunk_size.max(1)).max(1);
    u32::try_from(chunks).map_err(|_| {
        DirectoryError::InvalidInput(format!(
            "{} bytes in {}-byte chunks is {} chunks, more than a file record can hold",
            len, chunk_size, chunks
        ))
    })
}

/// Binary Merkle root over chunk hashes; an odd node is paired with itself.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"").into();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut hasher = Sha256::new();
                hasher.update(pair[0]);
                hasher.update(right);
                hasher.finalize().into()
            })
            .collect();
    }
    level[0]
}
