//! Wager Session Controller
//!
//! Owns the per-wager state machine and the contract binding.
//!
//! # Design Principles
//! 1. Never pay twice: no automatic retry of any payable call
//! 2. One wager at a time: overlapping `submit_wager()` fails with `WagerInProgress`
//! 3. Fail fast on stale bindings: a binding is tied to one wallet session generation
//! 4. Never show pre-wager liquidity after a confirmed transaction
//!
//! # State Machine
//! Idle -> Validating (binding + input + pre-flight balance check)
//! Validating -> Submitting (optional gas estimate, then `flip`)
//! Submitting -> Confirming (tx hash known, waiting for receipt under timeout)
//! Confirming -> Resolved (`getResult()`, then balance refresh)
//! any non-terminal -> Failed
//!
//! # Suspension Points
//! Balance fetch, gas estimation, submission, confirmation wait, outcome query.
//! Abandoning the call site (dropping the future) is the only cancellation;
//! the controller then records the wager as indeterminate if it may have been
//! broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{B256, U256};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::contract::{CallFailure, ContractBinding, ContractFactory, PendingTransaction};
use crate::error::WagerError;
use crate::types::{
    BalanceSnapshot, Receipt, SessionView, Side, WagerDraft, WagerOutcome, WagerRequest,
    WagerState, WithdrawalState,
};
use crate::wallet::{WalletSession, WalletSessionManager};

/// Which single-flight slot a guard holds
#[derive(Clone, Copy, Debug)]
enum FlightKind {
    Wager,
    Withdrawal,
}

/// Single-flight guard
///
/// Released on drop. If dropped before `complete()`, the operation was
/// abandoned mid-flight and the published state is settled accordingly.
struct Flight<'a> {
    flag: &'a AtomicBool,
    view: &'a watch::Sender<SessionView>,
    kind: FlightKind,
    completed: bool,
}

impl<'a> Flight<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        view: &'a watch::Sender<SessionView>,
        kind: FlightKind,
    ) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, view, kind, completed: false })
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            warn!("{:?} abandoned by caller before completion", self.kind);
            match self.kind {
                FlightKind::Wager => self.view.send_modify(|v| {
                    v.wager = abandoned_wager_state(&v.wager);
                }),
                FlightKind::Withdrawal => self.view.send_modify(|v| {
                    if let WithdrawalState::Pending { tx_hash } = v.withdrawal {
                        v.withdrawal = WithdrawalState::Failed {
                            error: WagerError::ConfirmationTimeout {
                                tx_hash,
                                reason: "abandoned before confirmation".to_string(),
                            },
                        };
                    }
                }),
            }
        }
        self.flag.store(false, Ordering::Release);
    }
}

/// Settle a wager whose call site went away
///
/// Once a receipt is in hand the state is already `Resolved` or `Failed`
/// and is left as is.
fn abandoned_wager_state(state: &WagerState) -> WagerState {
    if !state.is_in_flight() {
        return state.clone();
    }
    let reason = "abandoned before confirmation".to_string();
    match state {
        // Nothing has been broadcast yet
        WagerState::Validating => WagerState::Idle,
        WagerState::Confirming { tx_hash, .. } => WagerState::Failed {
            error: WagerError::ConfirmationTimeout { tx_hash: Some(*tx_hash), reason },
            tx_hash: Some(*tx_hash),
        },
        // Submitting: the wallet may already hold the request
        _ => WagerState::Failed {
            error: WagerError::ConfirmationTimeout { tx_hash: None, reason },
            tx_hash: None,
        },
    }
}

#[derive(Clone, Copy)]
enum SubmissionKind {
    Wager,
    Withdrawal,
}

/// Classify a failed `flip` / `withdraw` submission
///
/// A rejection or revert means nothing was broadcast. A transport failure
/// does not: the wallet or node may have accepted the transaction before the
/// connection dropped, so the outcome is unknown.
fn submission_error(failure: CallFailure, kind: SubmissionKind) -> WagerError {
    match (failure, kind) {
        (CallFailure::Transport(reason), _) => WagerError::ConfirmationTimeout {
            tx_hash: None,
            reason: format!("submission outcome unknown: {}", reason),
        },
        (failure, SubmissionKind::Wager) => WagerError::SubmissionRejected { reason: failure.to_string() },
        (failure, SubmissionKind::Withdrawal) => {
            WagerError::WithdrawalRejected { reason: failure.to_string() }
        }
    }
}

/// Wager Session Controller
pub struct WagerController {
    wallet: Arc<WalletSessionManager>,
    factory: Arc<dyn ContractFactory>,
    config: ClientConfig,
    binding: watch::Sender<Option<ContractBinding>>,
    view: watch::Sender<SessionView>,
    wager_in_flight: AtomicBool,
    withdrawal_in_flight: AtomicBool,
}

impl WagerController {
    pub fn new(
        wallet: Arc<WalletSessionManager>,
        factory: Arc<dyn ContractFactory>,
        config: ClientConfig,
    ) -> Self {
        let (binding, _) = watch::channel(None);
        let (view, _) = watch::channel(SessionView {
            account: wallet.current().map(|s| s.account()),
            ..SessionView::default()
        });
        Self {
            wallet,
            factory,
            config,
            binding,
            view,
            wager_in_flight: AtomicBool::new(false),
            withdrawal_in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Arc<WalletSessionManager> {
        &self.wallet
    }

    /// Current view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Current binding, if any (may be stale)
    pub fn binding(&self) -> Option<ContractBinding> {
        self.binding.borrow().clone()
    }

    // ------------------------------------------------------------------------
    // Wallet
    // ------------------------------------------------------------------------

    /// Connect (or reconnect) the wallet and publish the new identity
    ///
    /// An existing binding becomes stale; `bind_contract()` must run again
    /// before the next wager. Wagers already submitted are unaffected.
    pub async fn connect(&self) -> Result<WalletSession, WagerError> {
        let session = self.wallet.connect().await?;

        let stale = match self.binding.borrow().as_ref() {
            Some(binding) if binding.generation() != session.generation() => {
                info!(
                    "Binding for {} from generation {} is now stale (current {}), rebind required",
                    binding.account(),
                    binding.generation(),
                    session.generation()
                );
                true
            }
            _ => false,
        };

        self.view.send_modify(|v| {
            v.account = Some(session.account());
            if stale {
                v.binding_generation = None;
            }
        });
        Ok(session)
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Bind the contract to the current signer and fetch its balance
    ///
    /// On failure the previous binding (if any) stays in place.
    pub async fn bind_contract(&self) -> Result<BalanceSnapshot, WagerError> {
        let session = self
            .wallet
            .current()
            .ok_or_else(|| WagerError::binding("wallet not connected"))?;
        let address = self.config.contract_address;

        info!(
            "Binding contract {} for {} (generation {})",
            address,
            session.account(),
            session.generation()
        );

        let handle = self.factory.bind(address, session.signer()).await.map_err(|e| {
            warn!("Contract binding failed: {}", e);
            WagerError::binding(e.to_string())
        })?;

        let wei = handle.get_balance().await.map_err(|e| {
            warn!("Initial balance fetch failed, binding discarded: {}", e);
            WagerError::binding(format!("balance fetch failed: {}", e))
        })?;

        let binding = ContractBinding::new(address, &session, handle);
        let snapshot = BalanceSnapshot::new(wei);
        info!("Contract bound, balance {} ETH", snapshot.display());

        self.binding.send_replace(Some(binding));
        self.view.send_modify(|v| {
            v.account = Some(session.account());
            v.binding_generation = Some(session.generation());
            v.balance = Some(snapshot.clone());
        });
        Ok(snapshot)
    }

    /// Binding usable for a NEW call: present and built from the current session
    fn current_binding(&self) -> Result<ContractBinding, WagerError> {
        let binding = self.binding.borrow().clone().ok_or(WagerError::NotInitialized)?;
        let current = self.wallet.generation();
        if !binding.is_current(current) {
            return Err(WagerError::binding(format!(
                "binding was built for wallet session generation {} but the current generation is {}; rebind the contract",
                binding.generation(),
                current.map(|g| g.to_string()).unwrap_or_else(|| "none".to_string())
            )));
        }
        Ok(binding)
    }

    /// Fetch and publish a fresh balance snapshot
    pub async fn refresh_balance(&self) -> Result<BalanceSnapshot, WagerError> {
        let binding = self.current_binding()?;
        let snapshot = self.fetch_balance(&binding).await?;
        self.publish_balance(Some(snapshot.clone()));
        Ok(snapshot)
    }

    async fn fetch_balance(&self, binding: &ContractBinding) -> Result<BalanceSnapshot, WagerError> {
        let wei = binding.contract().get_balance().await.map_err(|e| WagerError::ProviderError {
            reason: format!("balance fetch failed: {}", e),
        })?;
        debug!("Contract balance: {} wei", wei);
        Ok(BalanceSnapshot::new(wei))
    }

    fn publish_balance(&self, snapshot: Option<BalanceSnapshot>) {
        self.view.send_modify(|v| v.balance = snapshot);
    }

    // ------------------------------------------------------------------------
    // Wager input
    // ------------------------------------------------------------------------

    /// Replace the uncommitted wager fields; no validation, no network
    pub fn set_wager(&self, amount: impl Into<String>, side: Option<Side>) {
        let draft = WagerDraft { amount: amount.into(), side };
        self.view.send_modify(|v| v.draft = draft);
    }

    pub fn set_amount(&self, amount: impl Into<String>) {
        let amount = amount.into();
        self.view.send_modify(|v| v.draft.amount = amount);
    }

    pub fn set_side(&self, side: Side) {
        self.view.send_modify(|v| v.draft.side = Some(side));
    }

    // ------------------------------------------------------------------------
    // Wager lifecycle
    // ------------------------------------------------------------------------

    fn set_wager_state(&self, state: WagerState) {
        debug!("Wager state -> {}", state.name());
        self.view.send_modify(|v| v.wager = state);
    }

    fn fail_wager(&self, error: WagerError, tx_hash: Option<B256>) -> WagerError {
        if error.funds_may_have_moved() {
            error!("Wager outcome indeterminate: {}", error);
        } else {
            warn!("Wager failed: {}", error);
        }
        self.set_wager_state(WagerState::Failed { error: error.clone(), tx_hash });
        error
    }

    /// Drive the drafted wager to a terminal state
    ///
    /// Returns the resolved outcome. `ResolutionUnavailable` means the wager
    /// confirmed (funds moved) but its result could not be read.
    pub async fn submit_wager(&self) -> Result<WagerOutcome, WagerError> {
        let flight = match Flight::acquire(&self.wager_in_flight, &self.view, FlightKind::Wager) {
            Some(f) => f,
            None => {
                warn!("submit_wager rejected: another wager is in flight");
                return Err(WagerError::WagerInProgress);
            }
        };

        self.set_wager_state(WagerState::Validating);
        let result = self.run_wager().await;
        flight.complete();
        result
    }

    async fn run_wager(&self) -> Result<WagerOutcome, WagerError> {
        // 1. Preconditions (no network)
        let binding = self.current_binding().map_err(|e| self.fail_wager(e, None))?;
        let draft = self.view.borrow().draft.clone();
        let request = draft.to_request().map_err(|e| self.fail_wager(e, None))?;

        info!("Wager: {} ETH on {} ({} wei)", request.amount, request.side, request.value);

        // 2. Pre-flight balance check against a fresh snapshot
        let snapshot = self.fetch_balance(&binding).await.map_err(|e| self.fail_wager(e, None))?;
        self.publish_balance(Some(snapshot.clone()));
        if request.value > snapshot.wei {
            return Err(self.fail_wager(
                WagerError::InsufficientContractFunds {
                    requested: request.value,
                    available: snapshot.wei,
                },
                None,
            ));
        }

        // 3. Optional gas estimation (non-fatal)
        self.set_wager_state(WagerState::Submitting { request: request.clone(), gas_estimate: None });
        if self.config.estimate_gas {
            match binding.contract().estimate_flip(request.side.is_heads(), request.value).await {
                Ok(gas) => {
                    debug!("Estimated gas for flip: {}", gas);
                    self.set_wager_state(WagerState::Submitting {
                        request: request.clone(),
                        gas_estimate: Some(gas),
                    });
                }
                Err(e) => warn!("Gas estimation failed (continuing): {}", e),
            }
        }

        // The binding must still belong to the current session right before signing
        if !binding.is_current(self.wallet.generation()) {
            return Err(self.fail_wager(
                WagerError::binding("wallet session replaced during validation; rebind the contract"),
                None,
            ));
        }

        // 4. Submit; the request is consumed from here on
        self.view.send_modify(|v| v.draft = WagerDraft::default());
        let pending = binding
            .contract()
            .flip(request.side.is_heads(), request.value)
            .await
            .map_err(|e| self.fail_wager(submission_error(e, SubmissionKind::Wager), None))?;

        let tx_hash = pending.tx_hash();
        info!("Wager submitted: {}", tx_hash);
        self.set_wager_state(WagerState::Confirming { request: request.clone(), tx_hash });

        // 5. Confirmation under timeout
        let receipt = self.await_confirmation(pending).await.map_err(|e| self.fail_wager(e, Some(tx_hash)))?;

        if !receipt.success {
            // Mined but reverted: the wager did not take effect
            let reason = format!(
                "transaction {} reverted in block {}",
                tx_hash,
                receipt.block_number.map(|b| b.to_string()).unwrap_or_else(|| "?".to_string())
            );
            let err = self.fail_wager(WagerError::SubmissionRejected { reason }, Some(tx_hash));
            self.refresh_after_confirmation(&binding).await;
            return Err(err);
        }
        info!("Wager confirmed in block {:?}", receipt.block_number);

        // Confirmed from here on; the outcome is filled in once known
        self.set_wager_state(WagerState::Resolved {
            request: request.clone(),
            receipt: receipt.clone(),
            outcome: None,
        });

        // 6. Resolution, then 7. balance refresh regardless of resolution
        let resolution = self.resolve(&binding, &request, tx_hash).await;
        if let Ok(outcome) = &resolution {
            info!(
                "Wager resolved: coin landed {} ({})",
                outcome.side,
                if outcome.won { "won" } else { "lost" }
            );
            self.set_wager_state(WagerState::Resolved { request, receipt, outcome: Some(*outcome) });
        }
        self.refresh_after_confirmation(&binding).await;

        resolution.inspect_err(|e| error!("{}", e))
    }

    async fn await_confirmation(
        &self,
        pending: Box<dyn PendingTransaction>,
    ) -> Result<Receipt, WagerError> {
        let tx_hash = pending.tx_hash();
        let timeout = self.config.confirmation_timeout;

        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(e)) => Err(WagerError::ConfirmationTimeout {
                tx_hash: Some(tx_hash),
                reason: format!("confirmation failed: {}", e),
            }),
            Err(_) => Err(WagerError::ConfirmationTimeout {
                tx_hash: Some(tx_hash),
                reason: format!("no receipt within {}s", timeout.as_secs()),
            }),
        }
    }

    async fn resolve(
        &self,
        binding: &ContractBinding,
        request: &WagerRequest,
        tx_hash: B256,
    ) -> Result<WagerOutcome, WagerError> {
        let result = binding.contract().get_result().await.map_err(|e| {
            WagerError::ResolutionUnavailable { tx_hash, reason: e.to_string() }
        })?;

        if result.user_guess != request.side.is_heads() {
            // getResult() reflects the latest flip, which may not be ours
            warn!(
                "Contract reports guess {} but this wager chose {}",
                Side::from_heads(result.user_guess),
                request.side
            );
        }
        Ok(WagerOutcome::from(result))
    }

    /// After a mined transaction the old snapshot is invalid either way
    async fn refresh_after_confirmation(&self, binding: &ContractBinding) {
        match self.fetch_balance(binding).await {
            Ok(snapshot) => {
                debug!("Post-confirmation balance: {} ETH", snapshot.display());
                self.publish_balance(Some(snapshot));
            }
            Err(e) => {
                warn!("Post-confirmation balance refresh failed: {}", e);
                self.publish_balance(None);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Withdrawal
    // ------------------------------------------------------------------------

    fn set_withdrawal_state(&self, state: WithdrawalState) {
        self.view.send_modify(|v| v.withdrawal = state);
    }

    fn fail_withdrawal(&self, error: WagerError) -> WagerError {
        if error.funds_may_have_moved() {
            error!("Withdrawal outcome indeterminate: {}", error);
        } else {
            warn!("Withdrawal failed: {}", error);
        }
        self.set_withdrawal_state(WithdrawalState::Failed { error: error.clone() });
        error
    }

    /// Withdraw through the current signer; never retried
    ///
    /// Retrying is only safe once the previous attempt is known not to have
    /// happened, so that decision is left to the caller.
    pub async fn withdraw(&self) -> Result<Receipt, WagerError> {
        let flight =
            match Flight::acquire(&self.withdrawal_in_flight, &self.view, FlightKind::Withdrawal) {
                Some(f) => f,
                None => return Err(WagerError::WithdrawalInProgress),
            };

        let result = self.run_withdrawal().await;
        flight.complete();
        result
    }

    async fn run_withdrawal(&self) -> Result<Receipt, WagerError> {
        let binding = self.current_binding().map_err(|e| self.fail_withdrawal(e))?;

        info!("Submitting withdrawal from {}", binding.address());
        self.set_withdrawal_state(WithdrawalState::Pending { tx_hash: None });

        let pending = binding
            .contract()
            .withdraw()
            .await
            .map_err(|e| self.fail_withdrawal(submission_error(e, SubmissionKind::Withdrawal)))?;

        let tx_hash = pending.tx_hash();
        info!("Withdrawal submitted: {}", tx_hash);
        self.set_withdrawal_state(WithdrawalState::Pending { tx_hash: Some(tx_hash) });

        let receipt = self.await_confirmation(pending).await.map_err(|e| self.fail_withdrawal(e))?;

        // Settle the state before the refresh so an abandoned call keeps the receipt's verdict
        let result = if receipt.success {
            info!("Withdrawal confirmed in block {:?}", receipt.block_number);
            self.set_withdrawal_state(WithdrawalState::Confirmed { receipt: receipt.clone() });
            Ok(receipt)
        } else {
            Err(self.fail_withdrawal(WagerError::WithdrawalRejected {
                reason: format!("transaction {} reverted", tx_hash),
            }))
        };
        self.refresh_after_confirmation(&binding).await;
        result
    }

    /// Pre-flight check without submitting: would `amount` pass the balance guard?
    pub async fn can_cover(&self, amount: &str) -> Result<bool, WagerError> {
        let binding = self.current_binding()?;
        let value: U256 = crate::units::to_base_unit(amount)?;
        let snapshot = self.fetch_balance(&binding).await?;
        self.publish_balance(Some(snapshot.clone()));
        Ok(value <= snapshot.wei)
    }
}
