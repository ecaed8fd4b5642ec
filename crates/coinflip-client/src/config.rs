//! Client configuration
//!
//! Precedence: explicit values (CLI flags) > environment > defaults.
//!
//! Environment variables:
//! - COINFLIP_CONTRACT_ADDRESS
//! - COINFLIP_RPC_URL
//! - COINFLIP_CONFIRMATION_TIMEOUT_SECS
//! - COINFLIP_ESTIMATE_GAS (true/false)

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use url::Url;

use crate::{DEFAULT_CONTRACT_ADDRESS, DEFAULT_RPC_URL};

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Fixed CoinFlip contract address
    pub contract_address: Address,
    /// JSON-RPC endpoint (wallet + chain access)
    pub rpc_url: String,
    /// Upper bound on the confirmation wait; the network gives none
    pub confirmation_timeout: Duration,
    /// Interval between receipt polls
    pub receipt_poll_interval: Duration,
    /// Run gas estimation before submitting a wager
    pub estimate_gas: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            contract_address: Address::from_str(DEFAULT_CONTRACT_ADDRESS)
                .unwrap_or(Address::ZERO),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(1),
            estimate_gas: true,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by any COINFLIP_* variables that are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("COINFLIP_CONTRACT_ADDRESS") {
            config.contract_address = parse_address(&addr)?;
        }
        if let Some(url) = lookup("COINFLIP_RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(secs) = lookup("COINFLIP_CONFIRMATION_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid COINFLIP_CONFIRMATION_TIMEOUT_SECS '{}'", secs))?;
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("COINFLIP_ESTIMATE_GAS") {
            config.estimate_gas = parse_bool(&flag)
                .with_context(|| format!("Invalid COINFLIP_ESTIMATE_GAS '{}'", flag))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.rpc_url)
            .with_context(|| format!("Invalid RPC URL '{}'", self.rpc_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported RPC URL scheme '{}' (expected http or https)", url.scheme());
        }
        if self.contract_address == Address::ZERO {
            anyhow::bail!("Contract address must not be the zero address");
        }
        if self.confirmation_timeout.is_zero() {
            anyhow::bail!("Confirmation timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Parse a 0x-prefixed hex address
pub fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s.trim()).with_context(|| format!("Invalid address '{}'", s))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.contract_address, parse_address(DEFAULT_CONTRACT_ADDRESS).unwrap());
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
        assert!(config.estimate_gas);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("COINFLIP_CONTRACT_ADDRESS", "0x00000000000000000000000000000000000000aa"),
            ("COINFLIP_RPC_URL", "https://rpc.example.com"),
            ("COINFLIP_CONFIRMATION_TIMEOUT_SECS", "30"),
            ("COINFLIP_ESTIMATE_GAS", "false"),
        ]))
        .unwrap();

        assert_eq!(
            config.contract_address,
            parse_address("0x00000000000000000000000000000000000000aa").unwrap()
        );
        assert_eq!(config.rpc_url, "https://rpc.example.com");
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert!(!config.estimate_gas);
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(ClientConfig::from_lookup(lookup(&[("COINFLIP_CONTRACT_ADDRESS", "nope")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("COINFLIP_RPC_URL", "ws://x")])).is_err());
        assert!(
            ClientConfig::from_lookup(lookup(&[("COINFLIP_CONFIRMATION_TIMEOUT_SECS", "0")])).is_err()
        );
        assert!(ClientConfig::from_lookup(lookup(&[("COINFLIP_ESTIMATE_GAS", "maybe")])).is_err());
    }
}
