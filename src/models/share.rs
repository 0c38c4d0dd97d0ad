use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Account, Address, DISCRIMINATOR_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        };
        f.pad(s)
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(AccessLevel::Read),
            "write" => Ok(AccessLevel::Write),
            "admin" => Ok(AccessLevel::Admin),
            other => Err(format!("unknown access level '{}'", other)),
        }
    }
}

/// Permission for `grantee` on the file record at `file`. Revocation clears
/// `is_active`; the account itself stays on the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SharedAccessGrant {
    pub file: Address,
    pub grantee: Address,
    pub grantor: Address,
    pub access_level: AccessLevel,
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub granted_at: i64,
}

impl SharedAccessGrant {
    pub const FILE_OFFSET: usize = DISCRIMINATOR_LEN;
    pub const GRANTEE_OFFSET: usize = DISCRIMINATOR_LEN + Address::LEN;
    pub const GRANTOR_OFFSET: usize = DISCRIMINATOR_LEN + 2 * Address::LEN;

    /// Active and not past its expiry at `now` (unix seconds). The ledger may
    /// still report `is_active` for an expired grant.
    pub fn is_live_at(&self, now: i64) -> bool {
        self.is_active && self.expires_at.map_or(true, |t| t > now)
    }
}

impl Account for SharedAccessGrant {
    const NAME: &'static str = "SharedAccessGrant";
}
