//! CoinFlip contract over JSON-RPC
//!
//! # Calls
//! - views (`getResult`, `getBalance`): `eth_call` from the signer's account
//! - `flip` / `withdraw`: `eth_sendTransaction`, signed by the node
//! - gas: `eth_estimateGas` with the same transaction object
//! - confirmation: `eth_getTransactionReceipt` polled until non-null
//!
//! A transport error or client timeout on `eth_sendTransaction` is reported as
//! `CallFailure::Transport`. The node may still have accepted the transaction,
//! so the controller reports it as an unknown outcome rather than a rejection.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::client::{parse_quantity, RpcClient, RpcError};
use crate::contract::abi::ICoinFlip;
use crate::contract::{CallFailure, CoinFlipContract, ContractFactory, PendingTransaction};
use crate::types::{FlipResult, Receipt};
use crate::wallet::Signer;

/// Builds `RpcCoinFlip` handles after checking the address holds code
pub struct RpcContractFactory {
    client: RpcClient,
    poll_interval: Duration,
}

impl RpcContractFactory {
    pub fn new(client: RpcClient, poll_interval: Duration) -> Self {
        Self { client, poll_interval }
    }
}

#[async_trait]
impl ContractFactory for RpcContractFactory {
    async fn bind(
        &self,
        address: Address,
        signer: Arc<dyn Signer>,
    ) -> Result<Arc<dyn CoinFlipContract>, CallFailure> {
        let code: Bytes = self.client.request("eth_getCode", json!([address, "latest"])).await?;
        if code.is_empty() {
            return Err(CallFailure::Rejected(format!("no contract code at {}", address)));
        }
        debug!("Contract {} has {} bytes of code", address, code.len());

        Ok(Arc::new(RpcCoinFlip {
            client: self.client.clone(),
            address,
            from: signer.address(),
            poll_interval: self.poll_interval,
        }))
    }
}

/// Contract handle acting as one account
pub struct RpcCoinFlip {
    client: RpcClient,
    address: Address,
    from: Address,
    poll_interval: Duration,
}

impl RpcCoinFlip {
    fn tx_object(&self, data: Vec<u8>, value: Option<U256>) -> Value {
        let mut tx = json!({ "from": self.from, "to": self.address, "data": Bytes::from(data) });
        if let Some(value) = value {
            tx["value"] = json!(value);
        }
        tx
    }

    async fn call_view<C: SolCall>(&self, call: C) -> Result<C::Return, CallFailure> {
        let tx = self.tx_object(call.abi_encode(), None);
        let raw: Bytes = self.client.request("eth_call", json!([tx, "latest"])).await?;
        C::abi_decode_returns(&raw)
            .map_err(|e| CallFailure::Transport(format!("failed to decode {} return: {}", C::SIGNATURE, e)))
    }

    async fn send(&self, data: Vec<u8>, value: Option<U256>) -> Result<Box<dyn PendingTransaction>, CallFailure> {
        let tx = self.tx_object(data, value);
        let tx_hash: B256 = self.client.request("eth_sendTransaction", json!([tx])).await?;
        Ok(Box::new(RpcPendingTx {
            client: self.client.clone(),
            tx_hash,
            poll_interval: self.poll_interval,
        }))
    }
}

#[async_trait]
impl CoinFlipContract for RpcCoinFlip {
    async fn flip(
        &self,
        guess_is_heads: bool,
        value: U256,
    ) -> Result<Box<dyn PendingTransaction>, CallFailure> {
        let data = ICoinFlip::flipCall { _guess: guess_is_heads }.abi_encode();
        self.send(data, Some(value)).await
    }

    async fn estimate_flip(&self, guess_is_heads: bool, value: U256) -> Result<u64, CallFailure> {
        let data = ICoinFlip::flipCall { _guess: guess_is_heads }.abi_encode();
        let tx = self.tx_object(data, Some(value));
        let raw: String = self.client.request("eth_estimateGas", json!([tx])).await?;
        Ok(parse_quantity(&raw)?)
    }

    async fn withdraw(&self) -> Result<Box<dyn PendingTransaction>, CallFailure> {
        self.send(ICoinFlip::withdrawCall {}.abi_encode(), None).await
    }

    async fn get_result(&self) -> Result<FlipResult, CallFailure> {
        let ret = self.call_view(ICoinFlip::getResultCall {}).await?;
        Ok(FlipResult { flip_result: ret.flipResult, user_guess: ret.userGuess })
    }

    async fn get_balance(&self) -> Result<U256, CallFailure> {
        self.call_view(ICoinFlip::getBalanceCall {}).await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    gas_used: Option<String>,
    status: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<Receipt, RpcError> {
        let block_number = self.block_number.as_deref().map(parse_quantity).transpose()?;
        let gas_used = self.gas_used.as_deref().map(parse_quantity).transpose()?;
        // Pre-Byzantium receipts carry no status; treat as success
        let success = match self.status.as_deref() {
            Some(s) => parse_quantity(s)? == 1,
            None => true,
        };
        Ok(Receipt { tx_hash: self.transaction_hash, block_number, gas_used, success })
    }
}

/// Submitted transaction, confirmed by polling for its receipt
pub struct RpcPendingTx {
    client: RpcClient,
    tx_hash: B256,
    poll_interval: Duration,
}

#[async_trait]
impl PendingTransaction for RpcPendingTx {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait(self: Box<Self>) -> Result<Receipt, CallFailure> {
        let mut polls: u64 = 0;
        loop {
            match self
                .client
                .request::<Option<RawReceipt>>("eth_getTransactionReceipt", json!([self.tx_hash]))
                .await
            {
                Ok(Some(raw)) => {
                    let receipt = raw.into_receipt()?;
                    info!("Receipt for {} after {} polls (status ok: {})", self.tx_hash, polls, receipt.success);
                    return Ok(receipt);
                }
                Ok(None) => {}
                // The node may be briefly unreachable; the caller bounds the wait
                Err(RpcError::Transport(e)) => warn!("Receipt poll for {} failed: {}", self.tx_hash, e),
                Err(e) => return Err(e.into()),
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
