//! Wallet capability over JSON-RPC
//!
//! Keys live in the node (or the extension behind it); the client only names
//! the `from` account and lets `eth_sendTransaction` do the signing.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::client::RpcClient;
use crate::wallet::{ProviderFailure, Signer, WalletProvider};

/// Account whose transactions the node signs
#[derive(Clone, Debug)]
pub struct RpcSigner {
    address: Address,
}

impl RpcSigner {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl Signer for RpcSigner {
    fn address(&self) -> Address {
        self.address
    }
}

/// Wallet backed by a JSON-RPC endpoint
pub struct RpcWallet {
    client: RpcClient,
}

impl RpcWallet {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderFailure> {
        match self.client.request::<Vec<Address>>("eth_requestAccounts", json!([])).await {
            Ok(accounts) => Ok(accounts),
            Err(e) if e.is_method_not_found() => {
                // Plain nodes expose unlocked accounts without a permission prompt
                info!("eth_requestAccounts not supported by {}, using eth_accounts", self.client.url());
                Ok(self.client.request::<Vec<Address>>("eth_accounts", json!([])).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderFailure> {
        debug!("Using node-managed signer for {}", account);
        Ok(Arc::new(RpcSigner::new(account)))
    }
}
