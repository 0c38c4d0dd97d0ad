//! Read-only access to file content through a public content gateway.

use bytes::Bytes;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::FileRecord;

pub const DEFAULT_GATEWAY_HOST: &str = "ipfs.io";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content {cid} not found on gateway")]
    NotFound { cid: String },

    #[error("gateway returned status {0}")]
    Status(StatusCode),

    #[error("file '{0}' has no storage locator yet")]
    NotStored(String),

    #[error("content of '{0}' does not match its recorded hash")]
    HashMismatch(String),
}

#[derive(Clone, Debug)]
pub struct GatewayClient {
    client: reqwest::Client,
    host: String,
}

impl GatewayClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url_for(&self, cid: &str) -> String {
        format!("https://{}/ipfs/{}", self.host.trim_end_matches('/'), cid)
    }

    /// Link that can be handed out for a record. Only public records with a
    /// storage locator have one.
    pub fn share_link(&self, record: &FileRecord) -> Option<String> {
        match (&record.primary_cid, record.is_public) {
            (Some(cid), true) => Some(self.url_for(cid)),
            _ => None,
        }
    }

    pub async fn fetch(&self, cid: &str) -> Result<Bytes, GatewayError> {
        let response = self.client.get(self.url_for(cid)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound { cid: cid.to_string() }),
            status => Err(GatewayError::Status(status)),
        }
    }

    /// Fetches the content behind `record` and checks it against the
    /// recorded content hash.
    pub async fn download(&self, record: &FileRecord) -> Result<Bytes, GatewayError> {
        let cid = record
            .primary_cid
            .as_deref()
            .ok_or_else(|| GatewayError::NotStored(record.file_name.clone()))?;
        let data = self.fetch(cid).await?;
        verify_content(record, &data)?;
        Ok(data)
    }
}

pub fn verify_content(record: &FileRecord, data: &[u8]) -> Result<(), GatewayError> {
    let actual: [u8; 32] = Sha256::digest(data).into();
    if actual != record.content_hash {
        return Err(GatewayError::HashMismatch(record.file_name.clone()));
    }
    Ok(())
}
