//! Mint Orchestrator
//!
//! Purpose:
//!     Watch the mempool for competing mint calls while funding wallets
//!     are loaded, then send our own mints with a fee that outbids the top
//!     challenger seen so far.
//!
//! Flow:
//!     register wallets → refresh balances → start monitor → warmup →
//!     plan quantities → run_bounded(submit_call) → stop monitor
//!
//! Notes:
//!     - The fee floor is re-read from the challenger book for every mint,
//!       so later mints react to bids that arrived meanwhile.
//!     - The monitor is stopped on every exit path after it started.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::fees::{decide_fees, ChallengerBook};
use super::planner::plan_mints;
use crate::chain::SharedClient;
use crate::config::MintParams;
use crate::error::{is_validation, RunError};
use crate::exec::{run_bounded, RetryPolicy, ShutdownFlag};
use crate::mempool::decoder::{canonical_signature, encode_call, selector_of, Selector};
use crate::mempool::{MempoolMonitor, MonitorState, WatchFilter};
use crate::transfer::wallets::BALANCE_REFRESH_PARALLELISM;
use crate::transfer::{BalanceCache, SubmitterConfig, TransactionSubmitter, WalletBook};
use crate::types::FeeFloor;
use crate::units::{eth_to_wei, fee_to_eth, gwei_to_wei, wei_to_gwei_f64};

pub const DEFAULT_MINT_PARALLELISM: usize = 1;

#[derive(Debug, Clone)]
pub struct MintRunOptions {
    pub dry_run: bool,
    pub parallelism: usize,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for MintRunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallelism: DEFAULT_MINT_PARALLELISM,
            retry: RetryPolicy::immediate(3),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
pub struct MintRunSummary {
    pub plans: usize,
    pub minted: usize,
    pub skipped: usize,
    pub challengers: usize,
    pub interrupted: bool,
}

pub async fn run_mint(
    client: SharedClient,
    params: &MintParams,
    options: &MintRunOptions,
    shutdown: &ShutdownFlag,
) -> Result<MintRunSummary> {
    if options.dry_run {
        info!("Running in dry mode");
    } else {
        info!("Running in production mode");
    }

    let mut wallets = WalletBook::new();
    for (i, mint) in params.mints.iter().enumerate() {
        wallets.register_task_keys("mint", i, mint.keys.private_keys());
    }
    if wallets.is_empty() {
        return Err(RunError::NoWallets("mint").into());
    }

    let balances = BalanceCache::new();
    wallets
        .refresh_balances(&client, &balances, BALANCE_REFRESH_PARALLELISM, shutdown, options.retry)
        .await?;
    if shutdown.is_requested() {
        return Ok(MintRunSummary {
            interrupted: true,
            ..Default::default()
        });
    }

    let filter = WatchFilter::new(params.contract_address, params.watch_signatures.as_slice())?;
    let selector = selector_of(&canonical_signature(&params.mint_signature)?);
    let book = Arc::new(ChallengerBook::new());

    let mut monitor = MempoolMonitor::new(client.clone(), filter, params.flush_interval());
    monitor.start(book.clone()).await?;
    let outcome = mint_while_watching(&client, params, options, shutdown, &mut wallets, &book, selector).await;
    if monitor.state() == MonitorState::Stopped {
        warn!("Mempool monitor lost its subscription during the run; fee floors may be stale");
    }
    monitor.stop().await;
    outcome
}

async fn mint_while_watching(
    client: &SharedClient,
    params: &MintParams,
    options: &MintRunOptions,
    shutdown: &ShutdownFlag,
    wallets: &mut WalletBook,
    book: &ChallengerBook,
    selector: Selector,
) -> Result<MintRunSummary> {
    let warmup = params.warmup();
    info!("Watching mempool for {:?} before minting", warmup);
    if shutdown.requested_within(warmup).await {
        return Ok(MintRunSummary {
            interrupted: true,
            challengers: book.summary().observed,
            ..Default::default()
        });
    }

    let cap_wei = gwei_to_wei(params.fee_cap_gwei())?;
    let fee_reserve = fee_to_eth(params.gas_limit(), cap_wei)?;
    let price = params.mint_price_eth.unwrap_or_default();
    info!(
        "Processing {} mints | price={} ETH | gas reserve={} ETH",
        params.mints.len(),
        price,
        fee_reserve
    );
    let plans = plan_mints(&params.mints, wallets, price, fee_reserve);

    let mut summary = MintRunSummary {
        plans: plans.len(),
        ..Default::default()
    };
    let outbid_wei = gwei_to_wei(params.outbid_gwei.unwrap_or_default())?;
    if options.dry_run {
        let decision = decide_fees(&book.summary(), outbid_wei);
        info!(
            "Dry run: {} mints planned | challengers={} | fee floor={}",
            plans.len(),
            decision.challengers,
            display_floor(decision.floor)
        );
        summary.challengers = decision.challengers;
        return Ok(summary);
    }

    let priority_cap_wei = params
        .max_priority_fee_per_gas_gwei
        .map(gwei_to_wei)
        .transpose()?;
    let submitter = TransactionSubmitter::new(
        client.clone(),
        SubmitterConfig {
            fee_cap_wei: cap_wei,
            priority_cap_wei,
            poll_interval: options.poll_interval,
            retry: options.retry,
            ..Default::default()
        },
    );
    let contract: Address = params.contract_address;
    let total = plans.len();
    let processed = AtomicUsize::new(0);

    let outcomes = run_bounded(
        options.parallelism,
        || shutdown.is_requested(),
        plans,
        |plan| {
            let submitter = &submitter;
            let processed = &processed;
            async move {
                let decision = decide_fees(&book.summary(), outbid_wei);
                info!(
                    "mint #{}: {} x{} | challengers={} | fee floor={}",
                    plan.task_index,
                    plan.signer.address(),
                    plan.quantity,
                    decision.challengers,
                    display_floor(decision.floor)
                );
                let input: Bytes = encode_call(selector, &[U256::from(plan.quantity)]).into();
                let value = eth_to_wei(plan.value)?;
                let sent = submitter
                    .submit_call(&plan.signer, contract, Some(value), input, decision.floor)
                    .await;
                let outcome = match sent {
                    Ok(hash) => Some(hash),
                    Err(e) if is_validation(&e) => {
                        error!("Skipping mint #{} from {}: {:#}", plan.task_index, plan.signer.address(), e);
                        None
                    }
                    Err(e) => {
                        return Err(e.context(format!("mint #{} from {}", plan.task_index, plan.signer.address())))
                    }
                };
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Processed {}/{} mints", done, total);
                Ok(outcome)
            }
        },
    )
    .await?;

    summary.minted = outcomes.iter().filter(|o| o.is_some()).count();
    summary.skipped = outcomes.len() - summary.minted;
    summary.interrupted = outcomes.len() < total;
    summary.challengers = book.summary().observed;
    Ok(summary)
}

fn display_floor(floor: Option<FeeFloor>) -> String {
    floor
        .map(|f| {
            format!(
                "{:.2} gwei (tip {:.2} gwei)",
                wei_to_gwei_f64(f.max_fee_per_gas),
                wei_to_gwei_f64(f.max_priority_fee_per_gas)
            )
        })
        .unwrap_or_else(|| "none".to_string())
}
