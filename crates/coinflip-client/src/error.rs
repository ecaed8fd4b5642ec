//! Error taxonomy for wallet and wager operations
//!
//! Every failure is terminal for the operation that raised it and is never
//! retried by the core: retrying a payable call risks paying twice.
//!
//! Two variants are indeterminate (funds may have moved):
//! - `ConfirmationTimeout`: the transaction was broadcast, its fate is unknown
//! - `ResolutionUnavailable`: the transaction confirmed, the result is unknown
//!
//! Everything else is a clean failure: funds definitely did not move.

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units;

#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WagerError {
    /// No wallet capability in the host environment
    #[error("no wallet available; install or enable a wallet provider")]
    WalletUnavailable,

    #[error("request rejected by the user: {reason}")]
    UserRejected { reason: String },

    #[error("wallet provider error: {reason}")]
    ProviderError { reason: String },

    /// Binding could not be built, or the binding belongs to a replaced session
    #[error("contract binding error: {reason}")]
    BindingError { reason: String },

    /// Operation needs a contract binding and there is none
    #[error("contract not initialized")]
    NotInitialized,

    #[error("invalid wager input: {reason}")]
    InvalidInput { reason: String },

    #[error(
        "insufficient contract funds: wager {} ETH exceeds contract balance {} ETH",
        units::display_amount(*requested),
        units::display_amount(*available)
    )]
    InsufficientContractFunds { requested: U256, available: U256 },

    #[error("submission rejected: {reason}")]
    SubmissionRejected { reason: String },

    /// The transaction may or may not have been mined
    ///
    /// `tx_hash` is None when the call site was abandoned before the wallet
    /// returned a hash.
    #[error(
        "confirmation not observed{}: {reason}",
        tx_hash.as_ref().map(|h| format!(" for {}", h)).unwrap_or_default()
    )]
    ConfirmationTimeout { tx_hash: Option<B256>, reason: String },

    /// The wager confirmed but `getResult()` failed
    #[error("wager {tx_hash} confirmed but result unavailable: {reason}")]
    ResolutionUnavailable { tx_hash: B256, reason: String },

    #[error("withdrawal rejected: {reason}")]
    WithdrawalRejected { reason: String },

    #[error("a wager is already in progress")]
    WagerInProgress,

    #[error("a withdrawal is already in progress")]
    WithdrawalInProgress,
}

impl WagerError {
    /// True when the chain may have changed state even though the operation failed
    ///
    /// Front ends must present these differently from clean failures and must
    /// not offer an automatic resubmit.
    pub fn funds_may_have_moved(&self) -> bool {
        matches!(
            self,
            WagerError::ConfirmationTimeout { .. } | WagerError::ResolutionUnavailable { .. }
        )
    }

    /// Stable machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            WagerError::WalletUnavailable => "wallet_unavailable",
            WagerError::UserRejected { .. } => "user_rejected",
            WagerError::ProviderError { .. } => "provider_error",
            WagerError::BindingError { .. } => "binding_error",
            WagerError::NotInitialized => "not_initialized",
            WagerError::InvalidInput { .. } => "invalid_input",
            WagerError::InsufficientContractFunds { .. } => "insufficient_contract_funds",
            WagerError::SubmissionRejected { .. } => "submission_rejected",
            WagerError::ConfirmationTimeout { .. } => "confirmation_timeout",
            WagerError::ResolutionUnavailable { .. } => "resolution_unavailable",
            WagerError::WithdrawalRejected { .. } => "withdrawal_rejected",
            WagerError::WagerInProgress => "wager_in_progress",
            WagerError::WithdrawalInProgress => "withdrawal_in_progress",
        }
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        WagerError::InvalidInput { reason: reason.into() }
    }

    pub(crate) fn binding(reason: impl Into<String>) -> Self {
        WagerError::BindingError { reason: reason.into() }
    }
}
