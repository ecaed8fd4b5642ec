//! JSON-RPC 2.0 client
//!
//! One POST per request, ids increment per client. The node's `error` object
//! is surfaced as `RpcError::Rpc` with its numeric code so callers can tell a
//! user rejection (EIP-1193 code 4001) from a node failure.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::contract::CallFailure;
use crate::wallet::ProviderFailure;

/// EIP-1193: user rejected the request
pub const USER_REJECTED: i64 = 4001;
/// JSON-RPC: method not found
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Geth/Anvil: execution reverted
pub const EXECUTION_REVERTED: i64 = 3;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(USER_REJECTED)
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code() == Some(METHOD_NOT_FOUND)
    }

    pub fn is_revert(&self) -> bool {
        match self {
            RpcError::Rpc { code, message } => {
                *code == EXECUTION_REVERTED || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

impl From<RpcError> for CallFailure {
    fn from(err: RpcError) -> Self {
        if err.is_revert() {
            return CallFailure::Reverted(err.to_string());
        }
        match err {
            RpcError::Rpc { .. } => CallFailure::Rejected(err.to_string()),
            RpcError::Transport(_) | RpcError::Decode(_) => CallFailure::Transport(err.to_string()),
        }
    }
}

impl From<RpcError> for ProviderFailure {
    fn from(err: RpcError) -> Self {
        if err.is_user_rejection() {
            ProviderFailure::Rejected(err.to_string())
        } else {
            ProviderFailure::Other(err.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

/// JSON-RPC client
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and deserialize its `result`
    ///
    /// A `null` result deserializes into `T` as-is, so use `Option<T>` for
    /// methods that may return null.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!("RPC -> {} #{} {}", method, id, body["params"]);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RpcError::Transport(e.to_string()))?;

        let parsed: Response = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Transport(format!("HTTP {}: {}", status, text)));
            }
            Err(e) => return Err(RpcError::Decode(format!("{}: {}", method, e))),
        };

        if let Some(err) = parsed.error {
            debug!("RPC <- {} #{} error {}: {}", method, id, err.code, err.message);
            return Err(RpcError::Rpc { code: err.code, message: err.message });
        }

        let result = parsed.result.unwrap_or(Value::Null);
        debug!("RPC <- {} #{} {}", method, id, result);
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))
    }

    /// eth_chainId
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }
}

/// Hex quantity ("0x1a") as u64
pub fn parse_quantity(raw: &str) -> Result<u64, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Decode(format!("invalid quantity '{}': {}", raw, e)))
}

/// Hex quantity as U256
pub fn parse_u256(raw: &str) -> Result<U256, RpcError> {
    U256::from_str(raw).map_err(|e| RpcError::Decode(format!("invalid quantity '{}': {}", raw, e)))
}
