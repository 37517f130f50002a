//! Transfer ETH
//!
//! `run`: distribute ETH according to a transfer param file. The planned
//! queue is written to `logs/transfer-eth-transfer-queue_<ts>.tsv` before
//! anything is sent; press Enter within half a second to abort.
//!
//! `sweep`: move a whole wallet to an address through N fresh buffers.
//!
//! Usage:
//!   transfer-eth run params/transfer.json [--dry-run] [--parallelism N]
//!   transfer-eth sweep --to 0x... [--buffers N]      (key in SWEEP_PRIVATE_KEY)

use alloy::primitives::Address;
use anyhow::Result;
use clap::{Parser, Subcommand};
use mint_sentinel::chain::wallet::parse_private_key;
use mint_sentinel::chain::{AlloyChainClient, SharedClient};
use mint_sentinel::config::{load_env, ProviderParams, TransferParams};
use mint_sentinel::exec::{spawn_enter_listener, spawn_signal_listener, ShutdownFlag};
use mint_sentinel::logging;
use mint_sentinel::transfer::runner::DEFAULT_TRANSFER_PARALLELISM;
use mint_sentinel::transfer::{run_transfers, SubmitterConfig, TransactionSubmitter, TransferRunOptions};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "transfer-eth")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a transfer queue from a param file
    Run {
        params: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = DEFAULT_TRANSFER_PARALLELISM)]
        parallelism: usize,
    },
    /// Sweep one wallet through fresh buffer wallets
    Sweep {
        #[arg(long)]
        to: Address,
        #[arg(long, default_value_t = 0)]
        buffers: usize,
        #[arg(long, env = "SWEEP_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Provider endpoint; falls back to PROVIDER_URL
        #[arg(long, env = "PROVIDER_URL")]
        provider_url: String,
        #[arg(long, default_value = "60")]
        max_fee_per_gas_gwei: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();
    let log_path = logging::init("transfer-eth")?;
    info!("Logging to {}", log_path.display());

    let shutdown = ShutdownFlag::new();
    let _signals = spawn_signal_listener(shutdown.clone())?;
    let _enter = spawn_enter_listener(shutdown.clone())?;

    let outcome = match args.command {
        Command::Run {
            params,
            dry_run,
            parallelism,
        } => run(params, dry_run, parallelism, &shutdown).await,
        Command::Sweep {
            to,
            buffers,
            private_key,
            provider_url,
            max_fee_per_gas_gwei,
        } => sweep(to, buffers, &private_key, &provider_url, max_fee_per_gas_gwei).await,
    };
    if let Err(e) = &outcome {
        error!("transfer-eth failed: {:#}", e);
    }
    outcome
}

async fn run(path: PathBuf, dry_run: bool, parallelism: usize, shutdown: &ShutdownFlag) -> Result<()> {
    let params = TransferParams::load(&path)?;
    let provider = params.provider()?;
    let client = connect(&provider).await?;

    let options = TransferRunOptions {
        dry_run,
        parallelism: parallelism.max(1),
        ..Default::default()
    };
    let summary = run_transfers(client, &params, &options, shutdown).await?;
    info!(
        "Done | planned={} executed={} skipped={}{}",
        summary.plans,
        summary.executed,
        summary.skipped,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

async fn sweep(to: Address, buffers: usize, key: &str, url: &str, cap_gwei: Decimal) -> Result<()> {
    let from = parse_private_key(key)?;
    let client: SharedClient = Arc::new(AlloyChainClient::connect(url).await?);
    let submitter = TransactionSubmitter::new(client, SubmitterConfig::default().with_fee_cap_gwei(cap_gwei)?);
    info!("Sweeping {} -> {} through {} buffers", from.address(), to, buffers);
    let hash = submitter.transfer_through_buffers(from, to, buffers).await?;
    info!("Sweep complete: {}", hash);
    Ok(())
}

async fn connect(provider: &ProviderParams) -> Result<SharedClient> {
    Ok(Arc::new(AlloyChainClient::connect(&provider.resolved_url()).await?))
}
