//! Wallet Session Manager
//!
//! Establishes and holds the identity (account) and authorization (signer)
//! used to act on the user's behalf.
//!
//! # Session Lifecycle
//! - No session until `connect()` succeeds; nothing is persisted
//! - A session is never mutated: reconnecting publishes a NEW session with a
//!   higher generation, replacing the previous one
//! - A failed connect leaves the previous session untouched
//! - Contract bindings remember the generation they were built from; a binding
//!   from an older generation is stale and must be rebuilt

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::WagerError;

/// Failure reported by a wallet capability
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The user declined the request
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Other(String),
}

impl From<ProviderFailure> for WagerError {
    fn from(failure: ProviderFailure) -> Self {
        match failure {
            ProviderFailure::Rejected(reason) => WagerError::UserRejected { reason },
            ProviderFailure::Other(reason) => WagerError::ProviderError { reason },
        }
    }
}

/// Authorization to issue transactions for one account
pub trait Signer: Send + Sync + fmt::Debug {
    fn address(&self) -> Address;
}

/// Host wallet capability (browser extension, node-managed keys, ...)
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet to expose its accounts; may prompt the user
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderFailure>;

    /// Signer for an account previously returned by `request_accounts`
    async fn get_signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderFailure>;
}

/// Connected wallet identity
#[derive(Clone)]
pub struct WalletSession {
    account: Address,
    signer: Arc<dyn Signer>,
    generation: u64,
}

impl WalletSession {
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn signer(&self) -> Arc<dyn Signer> {
        self.signer.clone()
    }

    /// Monotonic connect counter; bindings compare against it
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("account", &self.account)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Wallet Session Manager
pub struct WalletSessionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    session: watch::Sender<Option<WalletSession>>,
    next_generation: AtomicU64,
}

impl WalletSessionManager {
    /// Manager backed by an available wallet capability
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self::with_provider(Some(provider))
    }

    /// Manager for a host without any wallet; `connect()` always fails
    pub fn unavailable() -> Self {
        Self::with_provider(None)
    }

    pub fn with_provider(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (session, _) = watch::channel(None);
        Self { provider, session, next_generation: AtomicU64::new(1) }
    }

    /// Request account access and build a new session
    ///
    /// Not retried on failure. Connecting again while connected is allowed and
    /// replaces the session (new generation).
    pub async fn connect(&self) -> Result<WalletSession, WagerError> {
        let provider = match &self.provider {
            Some(p) => p.clone(),
            None => {
                warn!("Connect requested but no wallet capability is available");
                return Err(WagerError::WalletUnavailable);
            }
        };

        info!("Requesting wallet accounts");
        let accounts = provider.request_accounts().await.map_err(|e| {
            warn!("Account request failed: {}", e);
            WagerError::from(e)
        })?;

        let account = match accounts.first() {
            Some(a) => *a,
            None => {
                warn!("Wallet returned no accounts");
                return Err(WagerError::ProviderError {
                    reason: "wallet exposed no accounts".to_string(),
                });
            }
        };

        let signer = provider.get_signer(account).await.map_err(|e| {
            warn!("Signer request for {} failed: {}", account, e);
            WagerError::from(e)
        })?;

        if signer.address() != account {
            return Err(WagerError::ProviderError {
                reason: format!(
                    "signer is bound to {} but account {} was requested",
                    signer.address(),
                    account
                ),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let session = WalletSession { account, signer, generation };
        info!("Wallet connected: {} (generation {})", account, generation);

        self.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Current session, if connected
    pub fn current(&self) -> Option<WalletSession> {
        self.session.borrow().clone()
    }

    /// Generation of the current session
    pub fn generation(&self) -> Option<u64> {
        self.session.borrow().as_ref().map(|s| s.generation)
    }

    /// Observe session changes
    pub fn subscribe(&self) -> watch::Receiver<Option<WalletSession>> {
        self.session.subscribe()
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSigner, MockWallet};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn test_connect_without_wallet() {
        let manager = WalletSessionManager::unavailable();
        let err = manager.connect().await.unwrap_err();
        assert_eq!(err, WagerError::WalletUnavailable);
        assert!(manager.current().is_none());
        assert!(!manager.is_available());
    }

    #[tokio::test]
    async fn test_connect_uses_first_account() {
        let wallet = MockWallet::with_accounts(vec![addr(1), addr(2)]);
        let manager = WalletSessionManager::new(Arc::new(wallet));

        let session = manager.connect().await.unwrap();
        assert_eq!(session.account(), addr(1));
        assert_eq!(session.signer().address(), addr(1));
        assert_eq!(manager.generation(), Some(session.generation()));
    }

    #[tokio::test]
    async fn test_connect_notifies_subscribers() {
        let manager = WalletSessionManager::new(Arc::new(MockWallet::with_accounts(vec![addr(7)])));
        let mut rx = manager.subscribe();
        assert!(rx.borrow().is_none());

        manager.connect().await.unwrap();
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone().unwrap();
        assert_eq!(seen.account(), addr(7));
    }

    #[tokio::test]
    async fn test_user_rejection_keeps_previous_session() {
        let wallet = Arc::new(MockWallet::with_accounts(vec![addr(3)]));
        let manager = WalletSessionManager::new(wallet.clone());
        let first = manager.connect().await.unwrap();

        wallet.reject_next("User denied account authorization");
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, WagerError::UserRejected { .. }));

        let current = manager.current().unwrap();
        assert_eq!(current.generation(), first.generation());
        assert_eq!(current.account(), addr(3));
    }

    #[tokio::test]
    async fn test_provider_error_and_empty_accounts() {
        let wallet = Arc::new(MockWallet::with_accounts(vec![]));
        let manager = WalletSessionManager::new(wallet.clone());
        assert!(matches!(manager.connect().await, Err(WagerError::ProviderError { .. })));

        wallet.fail_next("node unreachable");
        assert!(matches!(manager.connect().await, Err(WagerError::ProviderError { .. })));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_bumps_generation() {
        let manager = WalletSessionManager::new(Arc::new(MockWallet::with_accounts(vec![addr(4)])));
        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();

        assert_eq!(first.account(), second.account());
        assert!(second.generation() > first.generation());
        assert_eq!(manager.generation(), Some(second.generation()));
    }

    #[test]
    fn test_session_debug_hides_signer() {
        let session = WalletSession {
            account: addr(5),
            signer: Arc::new(MockSigner::new(addr(5))),
            generation: 9,
        };
        let debug_str = format!("{:?}", session);
        assert!(debug_str.contains("generation: 9"));
        assert!(!debug_str.contains("signer"));
    }
}
