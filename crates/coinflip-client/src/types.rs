//! Domain types for the wager lifecycle
//!
//! # Design Principles
//! 1. Presentation reads ONE value (`SessionView`), never a set of loose flags
//! 2. Every wager is in exactly one `WagerState` at a time
//! 3. Amounts on the wire are wei (`U256`); ether strings only exist at the edge
//! 4. All states serialize with a `status` tag so front ends can render them directly

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WagerError;
use crate::units;

// ============================================================================
// Wager Input
// ============================================================================

/// Coin side
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Heads,
    Tails,
}

impl Side {
    /// The contract encodes a side as `guessIsHeads`
    pub fn from_heads(is_heads: bool) -> Self {
        if is_heads {
            Side::Heads
        } else {
            Side::Tails
        }
    }

    pub fn is_heads(&self) -> bool {
        matches!(self, Side::Heads)
    }

    /// Parse from user input (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "heads" | "head" | "h" => Some(Side::Heads),
            "tails" | "tail" | "t" => Some(Side::Tails),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Heads => f.write_str("Heads"),
            Side::Tails => f.write_str("Tails"),
        }
    }
}

/// Uncommitted wager fields as entered by the user
///
/// Nothing here is validated; `amount` is kept exactly as typed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WagerDraft {
    /// Amount in ether, raw user input
    pub amount: String,
    /// Chosen side (no default)
    pub side: Option<Side>,
}

impl WagerDraft {
    /// Validate and freeze the draft into a request
    pub fn to_request(&self) -> Result<WagerRequest, WagerError> {
        let side = self.side.ok_or_else(|| WagerError::InvalidInput {
            reason: "no side selected".to_string(),
        })?;
        let value = units::to_base_unit(&self.amount)?;
        Ok(WagerRequest { amount: self.amount.trim().to_string(), value, side })
    }
}

/// Validated, immutable wager
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WagerRequest {
    /// Amount in ether as entered (trimmed)
    pub amount: String,
    /// Amount in wei, attached as `msg.value`
    pub value: U256,
    pub side: Side,
}

// ============================================================================
// Wager Results
// ============================================================================

/// Raw return of `getResult()`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlipResult {
    pub flip_result: bool,
    pub user_guess: bool,
}

/// Resolved outcome of a confirmed wager
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WagerOutcome {
    /// Side the coin landed on
    pub side: Side,
    /// Guess as recorded by the contract
    pub guess: Side,
    pub won: bool,
}

impl From<FlipResult> for WagerOutcome {
    fn from(result: FlipResult) -> Self {
        Self {
            side: Side::from_heads(result.flip_result),
            guess: Side::from_heads(result.user_guess),
            won: result.flip_result == result.user_guess,
        }
    }
}

/// Mined transaction receipt
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    /// false = reverted
    pub success: bool,
}

/// Contract liquidity at a point in time
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub wei: U256,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(wei: U256) -> Self {
        Self { wei, fetched_at: Utc::now() }
    }

    /// Balance in ether with trailing zeros trimmed
    pub fn display(&self) -> String {
        units::display_amount(self.wei)
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Per-wager state
///
/// Idle -> Validating -> Submitting -> Confirming -> Resolved,
/// with Failed reachable from every non-terminal state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WagerState {
    #[default]
    Idle,
    Validating,
    Submitting {
        request: WagerRequest,
        /// Gas estimate, if estimation ran and succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        gas_estimate: Option<u64>,
    },
    Confirming {
        request: WagerRequest,
        tx_hash: B256,
    },
    Resolved {
        request: WagerRequest,
        receipt: Receipt,
        /// None = confirmed but `getResult()` was unavailable
        outcome: Option<WagerOutcome>,
    },
    Failed {
        error: WagerError,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<B256>,
    },
}

impl WagerState {
    /// A wager in one of these states is still running
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WagerState::Validating | WagerState::Submitting { .. } | WagerState::Confirming { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WagerState::Resolved { .. } | WagerState::Failed { .. })
    }

    /// Short state name for logs and status lines
    pub fn name(&self) -> &'static str {
        match self {
            WagerState::Idle => "idle",
            WagerState::Validating => "validating",
            WagerState::Submitting { .. } => "submitting",
            WagerState::Confirming { .. } => "confirming",
            WagerState::Resolved { .. } => "resolved",
            WagerState::Failed { .. } => "failed",
        }
    }
}

/// Withdrawal progress (independent of the wager state)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WithdrawalState {
    #[default]
    Idle,
    Pending {
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<B256>,
    },
    Confirmed {
        receipt: Receipt,
    },
    Failed {
        error: WagerError,
    },
}

/// Everything the presentation layer needs, published on every transition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    /// Connected account (None until the wallet connects)
    pub account: Option<Address>,
    /// Generation of the current contract binding, if bound
    pub binding_generation: Option<u64>,
    pub draft: WagerDraft,
    pub wager: WagerState,
    pub balance: Option<BalanceSnapshot>,
    pub withdrawal: WithdrawalState,
}

impl SessionView {
    pub fn is_bound(&self) -> bool {
        self.binding_generation.is_some()
    }

    /// One-line status for terminals and logs
    pub fn status_line(&self) -> String {
        let account = self.account.map(|a| a.to_string()).unwrap_or_else(|| "None".to_string());
        let balance = self
            .balance
            .as_ref()
            .map(|b| format!("{} ETH", b.display()))
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "account={} bound={} wager={} balance={}",
            account,
            self.is_bound(),
            self.wager.name(),
            balance
        )
    }
}
