use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::DirectoryError;
use crate::gateway::GatewayClient;
use crate::ledger::Ledger;
use crate::models::{Address, FileRecord, FileStatus};
use crate::services::directory::{AccessDirectory, Mutation, TxOutcome};
use crate::services::upload::UploadManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-facing message describing the outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into() }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

pub fn notify<T>(action: &str, result: &std::result::Result<Mutation<T>, DirectoryError>) -> Notification {
    match result {
        Ok(Mutation { outcome: TxOutcome::Confirmed(id), .. }) => {
            Notification::new(NotificationLevel::Success, format!("{} confirmed ({})", action, id))
        }
        Ok(Mutation { outcome: TxOutcome::AlreadyProcessed(id), .. }) => Notification::new(
            NotificationLevel::Info,
            format!("{} was already processed ({}), ledger state verified", action, id),
        ),
        Err(e) => notify_error(action, e),
    }
}

pub fn notify_error(action: &str, error: &DirectoryError) -> Notification {
    match error {
        DirectoryError::NotConnected => {
            Notification::new(NotificationLevel::Error, "connect a wallet first")
        }
        DirectoryError::RateLimited => Notification::new(
            NotificationLevel::Warning,
            format!("{}: ledger node is rate limiting requests, try again shortly", action),
        ),
        DirectoryError::AlreadyInProgress { .. } => {
            Notification::new(NotificationLevel::Warning, format!("{}: {}", action, error))
        }
        DirectoryError::AlreadyUploaded(_) => Notification::new(NotificationLevel::Info, error.to_string()),
        other => Notification::new(NotificationLevel::Error, format!("{} failed: {}", action, other)),
    }
}

/// Registers a local file: creates its record, attaches the storage locator
/// and finalizes it. The content itself is expected to be pinned under
/// `cid` already. Re-running after a partial failure continues from the
/// record's current status when it holds the same content.
pub async fn handle_upload<L: Ledger>(
    directory: &AccessDirectory<L>,
    path: &Path,
    file_name: &str,
    cid: &str,
    chunk_size: usize,
) -> std::result::Result<Mutation<FileRecord>, DirectoryError> {
    let data = fs::read(path)
        .await
        .map_err(|e| DirectoryError::InvalidInput(format!("read {}: {}", path.display(), e)))?;
    let manifest = UploadManifest::from_bytes(&data, chunk_size)?;
    info!(
        "uploading '{}': {} bytes, {} chunks",
        file_name, manifest.file_size, manifest.chunk_count
    );

    let owner = directory.identity()?;
    let record = match directory.fetch_file(&owner, file_name).await? {
        None => {
            directory
                .create_file(file_name, manifest.file_size, manifest.content_hash, manifest.chunk_count)
                .await?
                .state
        }
        Some(existing)
            if existing.content_hash != manifest.content_hash || existing.file_size != manifest.file_size =>
        {
            return Err(DirectoryError::NameInUse(file_name.to_string()));
        }
        Some(existing) => {
            info!("resuming upload of '{}' from status {}", file_name, existing.status);
            existing
        }
    };

    match record.status {
        FileStatus::Uploading => {
            directory.register_storage(file_name, cid, manifest.merkle_root).await?;
        }
        FileStatus::Processing if record.primary_cid.as_deref() != Some(cid) => {
            return Err(DirectoryError::InvalidInput(format!(
                "'{}' is already stored under {}",
                file_name,
                record.primary_cid.as_deref().unwrap_or("no locator")
            )));
        }
        FileStatus::Processing => {}
        FileStatus::Active => return Err(DirectoryError::AlreadyUploaded(file_name.to_string())),
    }
    directory.finalize_file(file_name).await
}

/// Downloads `file_name` owned by `owner` (the connected wallet when
/// `None`) and writes it to `output`. Returns the number of bytes written.
pub async fn handle_download<L: Ledger>(
    directory: &AccessDirectory<L>,
    gateway: &GatewayClient,
    owner: Option<Address>,
    file_name: &str,
    output: &Path,
) -> Result<usize> {
    let owner = match owner {
        Some(owner) => owner,
        None => directory.identity()?,
    };
    let record = directory
        .fetch_file(&owner, file_name)
        .await?
        .ok_or_else(|| anyhow!("File '{}' not found for {}", file_name, owner))?;

    let data = gateway.download(&record).await.context("fetch from gateway")?;
    fs::write(output, &data)
        .await
        .with_context(|| format!("write {}", output.display()))?;
    info!(
        "downloaded '{}' (sha256 {}) to {}",
        file_name,
        record.content_hash_hex(),
        output.display()
    );
    Ok(data.len())
}

/// Share link for one of the caller's files.
pub async fn handle_share_link<L: Ledger>(
    directory: &AccessDirectory<L>,
    gateway: &GatewayClient,
    file_name: &str,
) -> Result<String> {
    let owner = directory.identity()?;
    let record = directory
        .fetch_file(&owner, file_name)
        .await?
        .ok_or_else(|| anyhow!("File '{}' not found", file_name))?;
    match gateway.share_link(&record) {
        Some(link) => Ok(link),
        None => {
            warn!("no link for '{}': public={} cid={:?}", file_name, record.is_public, record.primary_cid);
            Err(anyhow!("File '{}' must be public and stored before it can be shared by link", file_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TxId;

    fn ok(outcome: TxOutcome) -> std::result::Result<Mutation<()>, DirectoryError> {
        Ok(Mutation { outcome, state: () })
    }

    #[test]
    fn confirmed_is_success_and_already_processed_is_info() {
        let n = notify("make public", &ok(TxOutcome::Confirmed(TxId("abc".into()))));
        assert_eq!(n.level, NotificationLevel::Success);
        assert!(n.message.contains("abc"));

        let n = notify("make public", &ok(TxOutcome::AlreadyProcessed(TxId("abc".into()))));
        assert_eq!(n.level, NotificationLevel::Info);
    }

    #[test]
    fn rate_limit_and_in_progress_are_warnings() {
        let n = notify_error("grant", &DirectoryError::RateLimited);
        assert_eq!(n.level, NotificationLevel::Warning);

        let busy = DirectoryError::AlreadyInProgress {
            operation: "access change",
            target: Address::from_label("share"),
        };
        assert_eq!(notify_error("grant", &busy).level, NotificationLevel::Warning);
    }

    #[test]
    fn finished_upload_is_info() {
        let n = notify_error("upload", &DirectoryError::AlreadyUploaded("a.txt".into()));
        assert_eq!(n.level, NotificationLevel::Info);
        assert_eq!(n.message, "file 'a.txt' is already uploaded");
    }

    #[test]
    fn other_failures_are_errors() {
        let n = notify_error("create", &DirectoryError::NotConnected);
        assert_eq!(n, Notification::new(NotificationLevel::Error, "connect a wallet first"));

        let n = notify_error("create", &DirectoryError::NameInUse("a.txt".into()));
        assert_eq!(n.level, NotificationLevel::Error);
        assert!(n.message.contains("a.txt"));
        assert_eq!(n.to_string(), format!("[error] {}", n.message));
    }
}
