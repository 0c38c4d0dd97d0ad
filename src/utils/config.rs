use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenv::dotenv;

use crate::gateway::DEFAULT_GATEWAY_HOST;
use crate::models::Address;
use crate::services::directory::ClientSettings;
use crate::services::upload::DEFAULT_CHUNK_SIZE;

/// Label whose hash is the program id used when none is configured.
pub const DEFAULT_PROGRAM_LABEL: &str = "soldrive-program";

#[derive(Clone, Debug)]
pub struct Config {
    /// JSON-RPC endpoint of a ledger node. `None` runs against an in-memory
    /// ledger.
    pub rpc_url: Option<String>,
    pub program_id: Address,
    pub gateway_host: String,
    pub keypair_path: PathBuf,
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    pub rpc_retries: u32,
    pub retry_backoff: Duration,
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let settings = ClientSettings::default();
        Self {
            rpc_url: None,
            program_id: Address::from_label(DEFAULT_PROGRAM_LABEL),
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
            keypair_path: PathBuf::from("soldrive-keypair.json"),
            settle_timeout: settings.settle_timeout,
            poll_interval: settings.poll_interval,
            rpc_retries: settings.rpc_retries,
            retry_backoff: settings.retry_backoff,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{}: invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Config::default();

        let rpc_url = env::var("SOLDRIVE_RPC_URL").ok().filter(|u| !u.trim().is_empty());
        let program_id = match env::var("SOLDRIVE_PROGRAM_ID") {
            Ok(raw) => raw.trim().parse::<Address>().context("SOLDRIVE_PROGRAM_ID")?,
            Err(_) => defaults.program_id,
        };
        let gateway_host = env::var("SOLDRIVE_GATEWAY_HOST").unwrap_or(defaults.gateway_host);
        let keypair_path = env::var("SOLDRIVE_KEYPAIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.keypair_path);

        let ms = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parse_var::<u64>(key)?.map(Duration::from_millis).unwrap_or(default))
        };
        let settle_timeout = ms("SOLDRIVE_SETTLE_TIMEOUT_MS", defaults.settle_timeout)?;
        let poll_interval = ms("SOLDRIVE_POLL_INTERVAL_MS", defaults.poll_interval)?;
        let retry_backoff = ms("SOLDRIVE_RETRY_BACKOFF_MS", defaults.retry_backoff)?;
        let rpc_retries: u32 = parse_var("SOLDRIVE_RPC_RETRIES")?.unwrap_or(defaults.rpc_retries);
        let chunk_size: usize = parse_var("SOLDRIVE_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size);
        if chunk_size == 0 {
            return Err(anyhow!("SOLDRIVE_CHUNK_SIZE must be greater than zero"));
        }

        Ok(Self {
            rpc_url,
            program_id,
            gateway_host,
            keypair_path,
            settle_timeout,
            poll_interval,
            rpc_retries,
            retry_backoff,
            chunk_size,
        })
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            settle_timeout: self.settle_timeout,
            poll_interval: self.poll_interval,
            rpc_retries: self.rpc_retries,
            retry_backoff: self.retry_backoff,
        }
    }
}
