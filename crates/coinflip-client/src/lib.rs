//! CoinFlip wager client
//!
//! Drives a single wager against the CoinFlip contract from user intent to a
//! settled, reconciled result:
//! - `wallet`: Wallet Session Manager (account + signer)
//! - `contract`: capability traits for the remote contract and its binding
//! - `controller`: Wager Session Controller (the per-wager state machine)
//! - `units`: exact conversion between ether strings and wei
//! - `rpc`: Ethereum JSON-RPC backend (requires feature flag, on by default)
//!
//! # Contract Interface
//! ```solidity
//! function flip(bool _guess) public payable;
//! function withdraw() public;
//! function getResult() public view returns (bool, bool);
//! function getBalance() public view returns (uint256);
//! ```

pub mod config;
pub mod contract;
pub mod controller;
pub mod error;
pub mod types;
pub mod units;
pub mod wallet;

#[cfg(feature = "rpc")]
pub mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use config::ClientConfig;
pub use controller::WagerController;
pub use error::WagerError;
pub use types::*;
pub use wallet::{WalletSession, WalletSessionManager};

/// Deployed CoinFlip contract address used when nothing else is configured
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x6b55EBf625eF05Aa7a3746b8C7E6c7AFf11d9aEA";

/// Default JSON-RPC endpoint (local development node)
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
