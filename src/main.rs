//! Mint Sentinel
//!
//! Loads a mint param file, watches the mempool for competing mint calls
//! during the warmup, then mints from every configured wallet with a fee
//! above the top challenger.
//!
//! Usage:
//!   mint-sentinel params/mint.json [--dry-run] [--parallelism N]
//!
//! Press Enter (or send SIGINT/SIGTERM) to stop after in-flight mints.

use anyhow::Result;
use clap::Parser;
use mint_sentinel::chain::{AlloyChainClient, SharedClient};
use mint_sentinel::config::{load_env, MintParams};
use mint_sentinel::exec::{spawn_enter_listener, spawn_signal_listener, ShutdownFlag};
use mint_sentinel::logging;
use mint_sentinel::mint::{run_mint, MintRunOptions, DEFAULT_MINT_PARALLELISM};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mint-sentinel")]
struct Args {
    /// Mint params file (JSON, or TOML by extension)
    #[arg(env = "MINT_PARAMS")]
    params: PathBuf,

    /// Plan and report without sending transactions
    #[arg(long)]
    dry_run: bool,

    /// Mints in flight at once
    #[arg(long, default_value_t = DEFAULT_MINT_PARALLELISM)]
    parallelism: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();
    let log_path = logging::init("mint-sentinel")?;
    info!("Logging to {}", log_path.display());

    let params = MintParams::load(&args.params)?;
    info!("Loaded {} mint tasks from {}", params.mints.len(), args.params.display());

    let client: SharedClient = Arc::new(AlloyChainClient::connect(&params.provider_params.resolved_url()).await?);

    let shutdown = ShutdownFlag::new();
    let _signals = spawn_signal_listener(shutdown.clone())?;
    let _enter = spawn_enter_listener(shutdown.clone())?;

    let options = MintRunOptions {
        dry_run: args.dry_run,
        parallelism: args.parallelism.max(1),
        ..Default::default()
    };
    match run_mint(client, &params, &options, &shutdown).await {
        Ok(summary) => {
            info!(
                "Done | planned={} minted={} skipped={} challengers={}{}",
                summary.plans,
                summary.minted,
                summary.skipped,
                summary.challengers,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
            Ok(())
        }
        Err(e) => {
            error!("Mint run failed: {:#}", e);
            Err(e)
        }
    }
}
