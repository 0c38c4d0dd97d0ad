//! Wallet identity backed by an ed25519 keypair.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::models::Address;

pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    pub fn generate() -> Self {
        Wallet { signing_key: SigningKey::generate(&mut OsRng) }
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        Wallet { signing_key: SigningKey::from_bytes(&secret) }
    }

    pub fn address(&self) -> Address {
        Address(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Reads a keypair file: a JSON array of 64 bytes, secret followed by
    /// public key.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read keypair {}", path.display()))?;
        let bytes: Vec<u8> = serde_json::from_str(&raw).context("parse keypair json")?;
        if bytes.len() != 64 {
            return Err(anyhow!("keypair must be 64 bytes, got {}", bytes.len()));
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes[..32]);
        let wallet = Wallet::from_secret(secret);
        if wallet.address().as_bytes()[..] != bytes[32..] {
            return Err(anyhow!("keypair public half does not match secret"));
        }
        Ok(wallet)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = self.signing_key.to_bytes().to_vec();
        bytes.extend_from_slice(self.address().as_bytes());
        let data = serde_json::to_string(&bytes)?;
        fs::write(path, data).with_context(|| format!("write keypair {}", path.display()))?;
        Ok(())
    }
}

pub fn verify(signer: &Address, message: &[u8], signature: &Signature) -> bool {
    match VerifyingKey::from_bytes(signer.as_bytes()) {
        Ok(key) => key.verify(message, signature).is_ok(),
        Err(_) => false,
    }
}
