//! CoinFlip contract capability and binding
//!
//! The contract is an opaque remote service. Its randomness, payout and
//! accounting live on chain; the client only sees the calls below.
//!
//! A `ContractBinding` = fixed address + interface + the signer of ONE wallet
//! session. The binding stores that session's generation so a call against a
//! replaced session fails fast instead of signing with a stale signer.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::types::{FlipResult, Receipt};
use crate::wallet::{Signer, WalletSession};

/// Solidity interface of the deployed contract
pub mod abi {
    use alloy_sol_types::sol;

    sol! {
        interface ICoinFlip {
            function flip(bool _guess) external payable;
            function withdraw() external;
            function getResult() external view returns (bool flipResult, bool userGuess);
            function getBalance() external view returns (uint256);
        }
    }
}

/// Failure of a single contract call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallFailure {
    /// Declined by the signer (user) or refused by the node before broadcast
    #[error("rejected: {0}")]
    Rejected(String),
    /// EVM execution reverted
    #[error("reverted: {0}")]
    Reverted(String),
    /// Network or decoding problem; outcome of the call unknown
    #[error("transport: {0}")]
    Transport(String),
}

/// Broadcast transaction awaiting confirmation
#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn tx_hash(&self) -> B256;

    /// Wait until the transaction is mined; no internal timeout
    async fn wait(self: Box<Self>) -> Result<Receipt, CallFailure>;
}

/// Remote CoinFlip contract, already bound to a signer
#[async_trait]
pub trait CoinFlipContract: Send + Sync {
    /// `flip(guessIsHeads)` with `value` wei attached
    async fn flip(
        &self,
        guess_is_heads: bool,
        value: U256,
    ) -> Result<Box<dyn PendingTransaction>, CallFailure>;

    /// Gas estimate for the same `flip` call
    async fn estimate_flip(&self, guess_is_heads: bool, value: U256) -> Result<u64, CallFailure>;

    async fn withdraw(&self) -> Result<Box<dyn PendingTransaction>, CallFailure>;

    async fn get_result(&self) -> Result<FlipResult, CallFailure>;

    /// Contract liquidity in wei
    async fn get_balance(&self) -> Result<U256, CallFailure>;
}

/// Builds contract handles from an address and a signer
#[async_trait]
pub trait ContractFactory: Send + Sync {
    async fn bind(
        &self,
        address: Address,
        signer: Arc<dyn Signer>,
    ) -> Result<Arc<dyn CoinFlipContract>, CallFailure>;
}

/// Contract handle tied to the wallet session it was built from
#[derive(Clone)]
pub struct ContractBinding {
    address: Address,
    account: Address,
    generation: u64,
    handle: Arc<dyn CoinFlipContract>,
}

impl ContractBinding {
    pub(crate) fn new(
        address: Address,
        session: &WalletSession,
        handle: Arc<dyn CoinFlipContract>,
    ) -> Self {
        Self { address, account: session.account(), generation: session.generation(), handle }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Usable only while the session it was built from is still current
    pub fn is_current(&self, session_generation: Option<u64>) -> bool {
        session_generation == Some(self.generation)
    }

    pub fn contract(&self) -> &Arc<dyn CoinFlipContract> {
        &self.handle
    }
}

impl fmt::Debug for ContractBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractBinding")
            .field("address", &self.address)
            .field("account", &self.account)
            .field("generation", &self.generation)
            .finish()
    }
}
