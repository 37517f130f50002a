//! Wallet Balances
//!
//! Prints the ETH balance of every address in a TSV file (first column
//! holding an address), lowest first, followed by the total.
//!
//! Usage:
//!   wallet-balances wallets.tsv [--provider-url URL]

use anyhow::Result;
use clap::Parser;
use mint_sentinel::chain::{AlloyChainClient, SharedClient};
use mint_sentinel::config::load_env;
use mint_sentinel::exec::{spawn_enter_listener, spawn_signal_listener, RetryPolicy, ShutdownFlag};
use mint_sentinel::logging;
use mint_sentinel::tools::{collect_balances, log_report, parse_addresses, sort_and_sum};
use mint_sentinel::transfer::wallets::BALANCE_REFRESH_PARALLELISM;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "wallet-balances")]
struct Args {
    tsv: PathBuf,

    #[arg(long, env = "PROVIDER_URL")]
    provider_url: String,

    #[arg(long, default_value_t = BALANCE_REFRESH_PARALLELISM)]
    parallelism: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();
    logging::init("wallet-balances")?;

    let contents = std::fs::read_to_string(&args.tsv)?;
    let addresses = parse_addresses(&contents);
    let client: SharedClient = Arc::new(AlloyChainClient::connect(&args.provider_url).await?);

    let shutdown = ShutdownFlag::new();
    let _signals = spawn_signal_listener(shutdown.clone())?;
    let _enter = spawn_enter_listener(shutdown.clone())?;

    let total = addresses.len();
    let mut rows = collect_balances(
        &client,
        addresses,
        args.parallelism,
        &shutdown,
        RetryPolicy::immediate(3),
    )
    .await?;
    if shutdown.is_requested() {
        info!("Interrupted after {}/{} balances", rows.len(), total);
        return Ok(());
    }

    let sum = sort_and_sum(&mut rows);
    log_report(&rows, sum);
    Ok(())
}
