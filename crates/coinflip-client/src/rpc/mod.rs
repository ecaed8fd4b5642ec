//! Ethereum JSON-RPC backend
//!
//! Implements the wallet and contract capabilities against a single JSON-RPC
//! endpoint (a development node with unlocked accounts, or a wallet bridge
//! exposing EIP-1193 methods over HTTP).

pub mod client;
pub mod contract;
pub mod wallet;

pub use client::{RpcClient, RpcError};
pub use contract::{RpcCoinFlip, RpcContractFactory, RpcPendingTx};
pub use wallet::{RpcSigner, RpcWallet};

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::ClientConfig;
use crate::controller::WagerController;
use crate::wallet::WalletSessionManager;

/// Wire a controller to the configured endpoint
///
/// No request is sent yet; `connect()` is the first network call.
pub fn controller_from_config(config: ClientConfig) -> Result<WagerController> {
    config.validate()?;
    let client = RpcClient::new(&config.rpc_url)?;
    info!("Using JSON-RPC endpoint {}", client.url());

    let wallet = Arc::new(WalletSessionManager::new(Arc::new(RpcWallet::new(client.clone()))));
    let factory = Arc::new(RpcContractFactory::new(client, config.receipt_poll_interval));
    Ok(WagerController::new(wallet, factory, config))
}
