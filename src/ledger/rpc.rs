//! JSON-RPC 2.0 client for a remote ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AccountFilter, Blockhash, Ledger, LedgerError, Transaction, TxId};
use crate::models::Address;

#[derive(Clone, Debug)]
pub struct JsonRpcLedger {
    client: reqwest::Client,
    url: String,
    confirm_timeout: Duration,
    poll_interval: Duration,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_confirmation(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.confirm_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!("rpc {} #{}", method, id);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(LedgerError::RateLimited),
            status if !status.is_success() => {
                return Err(LedgerError::Transport(format!("{} failed (status {})", method, status)))
            }
            _ => {}
        }

        let envelope = response
            .json::<RpcResponse>()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        envelope.into_result()
    }

    async fn signature_status(&self, id: &TxId) -> Result<SignatureState, LedgerError> {
        let result = self.call("getSignatureStatuses", json!([[id.0]])).await?;
        parse_signature_status(&result)
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, LedgerError> {
        if let Some(err) = self.error {
            return Err(classify_rpc_error(err.code, &err.message));
        }
        self.result
            .ok_or_else(|| LedgerError::InvalidResponse("missing result".to_string()))
    }
}

pub(crate) fn classify_rpc_error(code: i64, message: &str) -> LedgerError {
    let lower = message.to_ascii_lowercase();
    if code == 429 || lower.contains("too many requests") || lower.contains("rate limit") {
        LedgerError::RateLimited
    } else if lower.contains("already been processed") || lower.contains("already processed") {
        LedgerError::AlreadyProcessed
    } else {
        LedgerError::Rejected(format!("{} (code {})", message, code))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SignatureState {
    Unknown,
    Pending,
    Confirmed,
    Failed(String),
}

fn invalid(what: &str) -> LedgerError {
    LedgerError::InvalidResponse(what.to_string())
}

fn decode_data(data: &Value) -> Result<Vec<u8>, LedgerError> {
    let encoded = data
        .get(0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("account data"))?;
    if data.get(1).and_then(Value::as_str) != Some("base64") {
        return Err(invalid("account data encoding"));
    }
    STANDARD
        .decode(encoded)
        .map_err(|e| LedgerError::InvalidResponse(format!("account data: {}", e)))
}

pub(crate) fn parse_account_info(result: &Value) -> Result<Option<Vec<u8>>, LedgerError> {
    match result.get("value") {
        None => Err(invalid("missing value")),
        Some(Value::Null) => Ok(None),
        Some(account) => {
            let data = account.get("data").ok_or_else(|| invalid("missing data"))?;
            decode_data(data).map(Some)
        }
    }
}

pub(crate) fn parse_program_accounts(result: &Value) -> Result<Vec<(Address, Vec<u8>)>, LedgerError> {
    let entries = result.as_array().ok_or_else(|| invalid("expected account list"))?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let pubkey = entry
            .get("pubkey")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing pubkey"))?;
        let address: Address = pubkey
            .parse()
            .map_err(|e| LedgerError::InvalidResponse(format!("pubkey {}: {}", pubkey, e)))?;
        let data = entry
            .get("account")
            .and_then(|a| a.get("data"))
            .ok_or_else(|| invalid("missing account data"))?;
        out.push((address, decode_data(data)?));
    }
    Ok(out)
}

pub(crate) fn parse_blockhash(result: &Value) -> Result<Blockhash, LedgerError> {
    let encoded = result
        .get("value")
        .and_then(|v| v.get("blockhash"))
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing blockhash"))?;
    let address: Address = encoded
        .parse()
        .map_err(|e| LedgerError::InvalidResponse(format!("blockhash: {}", e)))?;
    Ok(Blockhash(address.0))
}

pub(crate) fn parse_signature_status(result: &Value) -> Result<SignatureState, LedgerError> {
    let status = result
        .get("value")
        .and_then(|v| v.get(0))
        .ok_or_else(|| invalid("missing status list"))?;
    if status.is_null() {
        return Ok(SignatureState::Unknown);
    }
    match status.get("err") {
        Some(Value::Null) | None => {}
        Some(err) => return Ok(SignatureState::Failed(err.to_string())),
    }
    match status.get("confirmationStatus").and_then(Value::as_str) {
        Some("confirmed") | Some("finalized") => Ok(SignatureState::Confirmed),
        _ => Ok(SignatureState::Pending),
    }
}

fn filter_json(filter: &AccountFilter) -> Value {
    match filter {
        AccountFilter::Memcmp { offset, bytes } => json!({
            "memcmp": { "offset": offset, "bytes": bs58::encode(bytes).into_string() }
        }),
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        let result = self
            .call("getAccountInfo", json!([address.to_string(), { "encoding": "base64" }]))
            .await?;
        parse_account_info(&result)
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Address, Vec<u8>)>, LedgerError> {
        let filters: Vec<Value> = filters.iter().map(filter_json).collect();
        let result = self
            .call(
                "getProgramAccounts",
                json!([program_id.to_string(), { "encoding": "base64", "filters": filters }]),
            )
            .await?;
        parse_program_accounts(&result)
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let result = self.call("getLatestBlockhash", json!([{ "commitment": "confirmed" }])).await?;
        parse_blockhash(&result)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<TxId, LedgerError> {
        let bytes = bincode::serialize(tx).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let result = self
            .call("sendTransaction", json!([STANDARD.encode(bytes), { "encoding": "base64" }]))
            .await?;
        result
            .as_str()
            .map(|s| TxId(s.to_string()))
            .ok_or_else(|| invalid("transaction id"))
    }

    async fn confirm_transaction(&self, id: &TxId) -> Result<(), LedgerError> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            match self.signature_status(id).await {
                Ok(SignatureState::Confirmed) => return Ok(()),
                Ok(SignatureState::Failed(err)) => return Err(LedgerError::Rejected(err)),
                Ok(SignatureState::Unknown) | Ok(SignatureState::Pending) => {}
                Err(LedgerError::RateLimited) => warn!("rate limited while confirming {}", id),
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::Unconfirmed(id.clone()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
