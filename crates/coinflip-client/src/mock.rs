//! In-process wallet and contract doubles that record every call

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::contract::{CallFailure, CoinFlipContract, ContractFactory, PendingTransaction};
use crate::types::{FlipResult, Receipt};
use crate::wallet::{ProviderFailure, Signer, WalletProvider};

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

// ============================================================================
// Wallet
// ============================================================================

#[derive(Debug)]
pub struct MockSigner {
    address: Address,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl Signer for MockSigner {
    fn address(&self) -> Address {
        self.address
    }
}

#[derive(Default)]
pub struct MockWallet {
    accounts: Mutex<Vec<Address>>,
    next_failure: Mutex<Option<ProviderFailure>>,
}

impl MockWallet {
    pub fn with_accounts(accounts: Vec<Address>) -> Self {
        Self { accounts: Mutex::new(accounts), next_failure: Mutex::new(None) }
    }

    pub fn reject_next(&self, reason: &str) {
        *self.next_failure.lock().unwrap() = Some(ProviderFailure::Rejected(reason.to_string()));
    }

    pub fn fail_next(&self, reason: &str) {
        *self.next_failure.lock().unwrap() = Some(ProviderFailure::Other(reason.to_string()));
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderFailure> {
        if let Some(failure) = self.next_failure.lock().unwrap().take() {
            return Err(failure);
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get_signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderFailure> {
        Ok(Arc::new(MockSigner::new(account)))
    }
}

// ============================================================================
// Contract
// ============================================================================

/// Recorded contract interaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Flip { guess_is_heads: bool, value: U256 },
    Estimate,
    Withdraw,
    GetResult,
    GetBalance,
}

/// How a submitted transaction behaves while being awaited
#[derive(Clone)]
pub enum WaitBehavior {
    Confirm,
    Revert,
    Fail(String),
    /// Never completes
    Hang,
    /// Completes (confirmed) once the gate is notified
    Gate(Arc<Notify>),
}

pub struct MockContract {
    calls: Mutex<Vec<Call>>,
    balance: Mutex<Result<U256, CallFailure>>,
    /// Balance reported after a confirmed flip/withdraw
    balance_after_tx: Mutex<Option<U256>>,
    submit: Mutex<Result<(), CallFailure>>,
    withdraw_submit: Mutex<Result<(), CallFailure>>,
    wait: Mutex<WaitBehavior>,
    result: Mutex<Result<FlipResult, CallFailure>>,
    /// `getResult()` never returns
    result_hangs: AtomicBool,
    estimate: Mutex<Result<u64, CallFailure>>,
    /// `flip()` holds until notified
    submit_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockContract {
    pub fn with_balance(balance: U256) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            balance: Mutex::new(Ok(balance)),
            balance_after_tx: Mutex::new(None),
            submit: Mutex::new(Ok(())),
            withdraw_submit: Mutex::new(Ok(())),
            wait: Mutex::new(WaitBehavior::Confirm),
            result: Mutex::new(Ok(FlipResult { flip_result: true, user_guess: true })),
            result_hangs: AtomicBool::new(false),
            estimate: Mutex::new(Ok(42_000)),
            submit_gate: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn flip_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Flip { .. }))
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_balance_after_tx(&self, balance: U256) {
        *self.balance_after_tx.lock().unwrap() = Some(balance);
    }

    pub fn fail_balance(&self, reason: &str) {
        *self.balance.lock().unwrap() = Err(CallFailure::Transport(reason.to_string()));
    }

    pub fn reject_submit(&self, failure: CallFailure) {
        *self.submit.lock().unwrap() = Err(failure);
    }

    pub fn reject_withdraw(&self, failure: CallFailure) {
        *self.withdraw_submit.lock().unwrap() = Err(failure);
    }

    pub fn set_wait(&self, behavior: WaitBehavior) {
        *self.wait.lock().unwrap() = behavior;
    }

    pub fn set_result(&self, result: Result<FlipResult, CallFailure>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn hang_result(&self) {
        self.result_hangs.store(true, Ordering::SeqCst);
    }

    pub fn gate_submit(&self, gate: Arc<Notify>) {
        *self.submit_gate.lock().unwrap() = Some(gate);
    }

    pub fn fail_estimate(&self, reason: &str) {
        *self.estimate.lock().unwrap() = Err(CallFailure::Reverted(reason.to_string()));
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn pending(contract: &Arc<Self>, seed: u8) -> Box<dyn PendingTransaction> {
        let n = contract.calls.lock().unwrap().len() as u8;
        Box::new(MockPendingTx {
            tx_hash: B256::repeat_byte(seed.wrapping_add(n)),
            behavior: contract.wait.lock().unwrap().clone(),
            contract: contract.clone(),
        })
    }

    fn on_confirmed(&self) {
        if let Some(after) = self.balance_after_tx.lock().unwrap().take() {
            *self.balance.lock().unwrap() = Ok(after);
        }
    }
}

/// `Arc` wrapper so pending transactions can reach back into the contract
#[derive(Clone)]
pub struct SharedMockContract(pub Arc<MockContract>);

#[async_trait]
impl CoinFlipContract for SharedMockContract {
    async fn flip(
        &self,
        guess_is_heads: bool,
        value: U256,
    ) -> Result<Box<dyn PendingTransaction>, CallFailure> {
        self.0.record(Call::Flip { guess_is_heads, value });
        let gate = self.0.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.0.submit.lock().unwrap().clone()?;
        Ok(MockContract::pending(&self.0, 0x10))
    }

    async fn estimate_flip(&self, _guess_is_heads: bool, _value: U256) -> Result<u64, CallFailure> {
        self.0.record(Call::Estimate);
        self.0.estimate.lock().unwrap().clone()
    }

    async fn withdraw(&self) -> Result<Box<dyn PendingTransaction>, CallFailure> {
        self.0.record(Call::Withdraw);
        self.0.withdraw_submit.lock().unwrap().clone()?;
        Ok(MockContract::pending(&self.0, 0x80))
    }

    async fn get_result(&self) -> Result<FlipResult, CallFailure> {
        self.0.record(Call::GetResult);
        if self.0.result_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.0.result.lock().unwrap().clone()
    }

    async fn get_balance(&self) -> Result<U256, CallFailure> {
        self.0.record(Call::GetBalance);
        self.0.balance.lock().unwrap().clone()
    }
}

struct MockPendingTx {
    tx_hash: B256,
    behavior: WaitBehavior,
    contract: Arc<MockContract>,
}

impl MockPendingTx {
    fn receipt(&self, success: bool) -> Receipt {
        Receipt { tx_hash: self.tx_hash, block_number: Some(100), gas_used: Some(42_000), success }
    }
}

#[async_trait]
impl PendingTransaction for MockPendingTx {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait(self: Box<Self>) -> Result<Receipt, CallFailure> {
        match self.behavior.clone() {
            WaitBehavior::Confirm => {
                self.contract.on_confirmed();
                Ok(self.receipt(true))
            }
            WaitBehavior::Revert => Ok(self.receipt(false)),
            WaitBehavior::Fail(reason) => Err(CallFailure::Transport(reason)),
            WaitBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            WaitBehavior::Gate(gate) => {
                gate.notified().await;
                self.contract.on_confirmed();
                Ok(self.receipt(true))
            }
        }
    }
}

/// Factory handing out one shared mock contract
pub struct MockFactory {
    pub contract: Arc<MockContract>,
    binds: Mutex<Vec<Address>>,
    fail: Mutex<Option<CallFailure>>,
}

impl MockFactory {
    pub fn new(contract: Arc<MockContract>) -> Self {
        Self { contract, binds: Mutex::new(Vec::new()), fail: Mutex::new(None) }
    }

    /// Signer addresses of every successful bind
    pub fn binds(&self) -> Vec<Address> {
        self.binds.lock().unwrap().clone()
    }

    pub fn fail_next(&self, failure: CallFailure) {
        *self.fail.lock().unwrap() = Some(failure);
    }
}

#[async_trait]
impl ContractFactory for MockFactory {
    async fn bind(
        &self,
        _address: Address,
        signer: Arc<dyn Signer>,
    ) -> Result<Arc<dyn CoinFlipContract>, CallFailure> {
        if let Some(failure) = self.fail.lock().unwrap().take() {
            return Err(failure);
        }
        self.binds.lock().unwrap().push(signer.address());
        Ok(Arc::new(SharedMockContract(self.contract.clone())))
    }
}
