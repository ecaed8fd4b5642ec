//! CoinFlip terminal front end
//!
//! Commands:
//! - `connect`: Request wallet access and print the account and chain id
//! - `balance`: Bind the contract and print its balance
//! - `flip`: Place one wager and wait for the outcome
//! - `withdraw`: Withdraw the contract balance (owner only on the reference contract)
//!
//! # Usage
//! ```bash
//! # Local node with unlocked accounts (anvil / hardhat)
//! coinflip --rpc-url http://127.0.0.1:8545 balance
//!
//! # Wager 0.5 ETH on heads
//! coinflip flip --amount 0.5 --side heads
//!
//! # Machine-readable final state
//! coinflip --json flip --amount 0.01 --side tails
//! ```
//!
//! Ctrl+C abandons the operation in flight. If a transaction was already
//! broadcast its on-chain status is unknown and must be checked before retrying.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use coinflip_client::rpc::{controller_from_config, RpcClient};
use coinflip_client::{ClientConfig, Side, WagerController, WagerError};

#[derive(Parser)]
#[command(name = "coinflip")]
#[command(about = "Wager on the CoinFlip contract from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON-RPC endpoint (overrides COINFLIP_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// CoinFlip contract address (overrides COINFLIP_CONTRACT_ADDRESS)
    #[arg(long, global = true)]
    contract: Option<Address>,

    /// Seconds to wait for a receipt before reporting an unknown outcome
    #[arg(long, global = true)]
    confirmation_timeout_secs: Option<u64>,

    /// Skip gas estimation before submitting a wager
    #[arg(long, global = true)]
    no_estimate_gas: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print the final session state as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Request wallet access and print the selected account
    Connect,

    /// Bind the contract and print its balance
    Balance,

    /// Place a wager and wait for the outcome
    Flip {
        /// Wager amount in ETH (e.g. 0.5)
        #[arg(long)]
        amount: String,

        /// Side to bet on (heads, tails)
        #[arg(long, value_parser = parse_side)]
        side: Side,
    },

    /// Withdraw the contract balance
    Withdraw,
}

fn parse_side(s: &str) -> Result<Side, String> {
    Side::parse(s).ok_or_else(|| format!("unknown side '{}' (expected heads or tails)", s))
}

impl Cli {
    /// Environment first, then flags on top
    fn config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;
        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(address) = self.contract {
            config.contract_address = address;
        }
        if let Some(secs) = self.confirmation_timeout_secs {
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        if self.no_estimate_gas {
            config.estimate_gas = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let config = cli.config()?;
    info!("Contract: {}", config.contract_address);
    info!("RPC: {}", config.rpc_url);
    info!("Confirmation timeout: {}s", config.confirmation_timeout.as_secs());

    let controller = controller_from_config(config)?;

    let result = match &cli.command {
        Commands::Connect => run_connect(&controller).await,
        Commands::Balance => run_balance(&controller).await,
        Commands::Flip { amount, side } => run_flip(&controller, amount, *side).await,
        Commands::Withdraw => run_withdraw(&controller).await,
    };

    let view = controller.view();
    info!("{}", view.status_line());
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    }

    result
}

/// Run `fut` unless Ctrl+C arrives first; dropping it abandons the call site
async fn abortable<T>(fut: impl Future<Output = Result<T, WagerError>>) -> Result<T> {
    tokio::select! {
        result = fut => result.map_err(report),
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, abandoning the operation in flight");
            warn!("If a transaction was broadcast, its on-chain status is unknown");
            anyhow::bail!("Interrupted")
        }
    }
}

fn report(err: WagerError) -> anyhow::Error {
    if err.funds_may_have_moved() {
        error!("=== Outcome UNKNOWN ===");
        error!("{}", err);
        error!("Funds may have moved. Check the transaction on chain before retrying.");
    } else {
        error!("{}", err);
    }
    anyhow::Error::new(err)
}

async fn connect_and_bind(controller: &WagerController) -> Result<()> {
    let session = abortable(controller.connect()).await?;
    info!("Account: {}", session.account());
    let snapshot = abortable(controller.bind_contract()).await?;
    info!("Contract balance: {} ETH", snapshot.display());
    Ok(())
}

async fn run_connect(controller: &WagerController) -> Result<()> {
    info!("=== Connect ===");
    let session = abortable(controller.connect()).await?;
    info!("Account: {}", session.account());

    let client = RpcClient::new(&controller.config().rpc_url)?;
    match client.chain_id().await {
        Ok(id) => info!("Chain id: {}", id),
        Err(e) => warn!("Chain id unavailable: {}", e),
    }
    Ok(())
}

async fn run_balance(controller: &WagerController) -> Result<()> {
    info!("=== Contract Balance ===");
    connect_and_bind(controller).await
}

async fn run_flip(controller: &WagerController, amount: &str, side: Side) -> Result<()> {
    info!("=== Flip ===");
    connect_and_bind(controller).await?;

    controller.set_wager(amount, Some(side));
    info!("Wagering {} ETH on {}", amount, side);

    let outcome = abortable(controller.submit_wager()).await?;

    info!("");
    info!("Result: {}", outcome.side);
    if outcome.won {
        info!("=== You WON ===");
    } else {
        info!("=== You lost ===");
    }
    if let Some(balance) = controller.view().balance {
        info!("Contract balance: {} ETH", balance.display());
    }
    Ok(())
}

async fn run_withdraw(controller: &WagerController) -> Result<()> {
    info!("=== Withdraw ===");
    connect_and_bind(controller).await?;

    let receipt = abortable(controller.withdraw()).await?;
    info!("Withdrawal confirmed: {} (block {:?})", receipt.tx_hash, receipt.block_number);
    Ok(())
}
