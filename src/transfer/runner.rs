//! Transfer queue run: balances → fees → plans → snapshot → execution.

use alloy::primitives::{Address, Bytes};
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info};

use super::planner::{hop_fee_eth, plan_transfers, MIN_TRANSFER_ETH};
use super::queue_log::write_snapshot;
use super::submitter::{SubmitterConfig, TransactionSubmitter};
use super::wallets::{BalanceCache, WalletBook, BALANCE_REFRESH_PARALLELISM};
use crate::chain::wallet::generate;
use crate::chain::SharedClient;
use crate::config::TransferParams;
use crate::error::{is_validation, RunError};
use crate::exec::{retry, run_bounded, RetryPolicy, ShutdownFlag};
use crate::types::TxDraft;
use crate::units::{eth_to_wei, gwei_to_wei};

pub const DEFAULT_TRANSFER_PARALLELISM: usize = 50;

#[derive(Debug, Clone)]
pub struct TransferRunOptions {
    pub dry_run: bool,
    pub parallelism: usize,
    pub log_dir: PathBuf,
    /// How long to wait for an Enter/signal before writing and executing
    /// the queue.
    pub confirm_window: Duration,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for TransferRunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallelism: DEFAULT_TRANSFER_PARALLELISM,
            log_dir: PathBuf::from("logs"),
            confirm_window: Duration::from_millis(500),
            retry: RetryPolicy::immediate(3),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
pub struct TransferRunSummary {
    pub plans: usize,
    pub executed: usize,
    pub skipped: usize,
    pub snapshot: Option<PathBuf>,
    pub interrupted: bool,
}

impl TransferRunSummary {
    fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Default::default()
        }
    }
}

pub async fn run_transfers(
    client: SharedClient,
    params: &TransferParams,
    options: &TransferRunOptions,
    shutdown: &ShutdownFlag,
) -> Result<TransferRunSummary> {
    info!("Processing {} transfers", params.transfers.len());
    let mut wallets = WalletBook::new();
    for (i, transfer) in params.transfers.iter().enumerate() {
        wallets.register_task_keys("transfer", i, transfer.keys.private_keys());
    }
    let Some(probe_address) = wallets.iter().next().map(|w| w.address()) else {
        return Err(RunError::NoWallets("send").into());
    };

    let balances = BalanceCache::new();
    wallets
        .refresh_balances(&client, &balances, BALANCE_REFRESH_PARALLELISM, shutdown, options.retry)
        .await?;
    if shutdown.is_requested() {
        return Ok(TransferRunSummary::interrupted());
    }
    prefetch_destinations(&client, params, &balances, options.retry, shutdown).await?;

    let probe = TxDraft {
        from: probe_address,
        to: probe_address,
        value: eth_to_wei(MIN_TRANSFER_ETH)?,
        input: Bytes::new(),
    };
    let gas_limit = retry(options.retry, "estimate_gas", || client.estimate_gas(&probe)).await?;
    let quote = retry(options.retry, "fee_quote", || client.fee_quote())
        .await
        .map_err(|e| {
            error!("Fee quote unavailable: {:#}", e);
            RunError::FeeQuoteUnavailable
        })?;
    let cap_wei = gwei_to_wei(params.fee_cap_gwei())?;
    let hop_fee = hop_fee_eth(gas_limit, &quote, cap_wei)?;

    info!("Populating transfers queue | gasLimit={} | fee per hop {} ETH", gas_limit, hop_fee);
    let plans = plan_transfers(&params.transfers, &mut wallets, &balances, hop_fee, &mut generate);

    if shutdown.requested_within(options.confirm_window).await {
        return Ok(TransferRunSummary::interrupted());
    }

    let snapshot = write_snapshot(&options.log_dir, "transfer-eth", &plans)?;
    info!("Saved transfers queue to {}", snapshot.display());

    let mut summary = TransferRunSummary {
        plans: plans.len(),
        snapshot: Some(snapshot),
        ..Default::default()
    };
    if options.dry_run {
        info!("Dry run: {} transfer threads not executed", plans.len());
        return Ok(summary);
    }

    let submitter = TransactionSubmitter::new(
        client.clone(),
        SubmitterConfig {
            fee_cap_wei: cap_wei,
            retry: options.retry,
            poll_interval: options.poll_interval,
            ..Default::default()
        },
    );
    let total = plans.len();
    let processed = AtomicUsize::new(0);
    info!("Executing transfers queue. Transfer threads: {}", total);

    let outcomes = run_bounded(
        options.parallelism,
        || shutdown.is_requested(),
        plans,
        |plan| {
            let submitter = &submitter;
            let processed = &processed;
            async move {
                let outcome = match submitter.execute_plan(&plan).await {
                    Ok(hashes) => Some(hashes),
                    Err(e) if is_validation(&e) => {
                        error!("Skipping transfer #{} from {}: {:#}", plan.request_index, plan.source, e);
                        None
                    }
                    Err(e) => return Err(e),
                };
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Processed {}/{} transfer threads", done, total);
                Ok(outcome)
            }
        },
    )
    .await?;

    summary.executed = outcomes.iter().filter(|o| o.is_some()).count();
    summary.skipped = outcomes.len() - summary.executed;
    summary.interrupted = outcomes.len() < total;
    Ok(summary)
}

/// Destination balances feed `toShouldRemainBalanceAtMost`.
async fn prefetch_destinations(
    client: &SharedClient,
    params: &TransferParams,
    balances: &BalanceCache,
    policy: RetryPolicy,
    shutdown: &ShutdownFlag,
) -> Result<()> {
    let mut seen = HashSet::new();
    let destinations: Vec<Address> = params
        .transfers
        .iter()
        .map(|t| t.to_address)
        .filter(|a| seen.insert(*a))
        .collect();

    run_bounded(
        BALANCE_REFRESH_PARALLELISM,
        || shutdown.is_requested(),
        destinations,
        |address| async move {
            if balances.get_or_fetch(client.as_ref(), address, policy).await.is_none() {
                error!("balance({}) failed", address);
            }
            Ok(())
        },
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::wallet::private_key_hex;
    use crate::config::{KeyRefs, TransferRequest};
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64.pow(18))
    }

    fn params(transfers: Vec<TransferRequest>) -> TransferParams {
        TransferParams {
            provider_params: None,
            infura_project_id: Some("test".into()),
            max_fee_per_gas_gwei: Some(dec!(60)),
            transfers,
        }
    }

    fn options(dir: &str, dry_run: bool) -> TransferRunOptions {
        TransferRunOptions {
            dry_run,
            log_dir: std::env::temp_dir().join(dir),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_moves_funds() {
        let mock = Arc::new(MockChain::new());
        let source = generate();
        let dest = generate().address();
        mock.set_balance(source.address(), eth(1));

        let request = TransferRequest {
            should_send_at_most: Some(dec!(0.5)),
            buffers_count: Some(1),
            to_address: dest,
            keys: KeyRefs::new(vec![private_key_hex(&source)], vec![]),
            ..Default::default()
        };
        let opts = options("mint_sentinel_runner_full", false);
        let summary = run_transfers(mock.clone(), &params(vec![request]), &opts, &ShutdownFlag::new())
            .await
            .unwrap();

        assert_eq!(summary.plans, 1);
        assert_eq!(summary.executed, 1);
        assert!(!summary.interrupted);
        assert!(summary.snapshot.as_ref().unwrap().exists());
        assert_eq!(mock.sent().len(), 2);
        // source kept what it did not route, destination got something
        assert!(mock.balance_of(source.address()) > U256::ZERO);
        assert!(mock.balance_of(dest) > U256::ZERO);

        let _ = std::fs::remove_dir_all(&opts.log_dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_writes_snapshot_only() {
        let mock = Arc::new(MockChain::new());
        let source = generate();
        mock.set_balance(source.address(), eth(1));
        let request = TransferRequest {
            to_address: generate().address(),
            keys: KeyRefs::new(vec![private_key_hex(&source)], vec![]),
            ..Default::default()
        };
        let opts = options("mint_sentinel_runner_dry", true);
        let summary = run_transfers(mock.clone(), &params(vec![request]), &opts, &ShutdownFlag::new())
            .await
            .unwrap();

        assert_eq!(summary.plans, 1);
        assert_eq!(summary.executed, 0);
        assert!(mock.sent().is_empty());
        let _ = std::fs::remove_dir_all(&opts.log_dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_key_skips_only_its_request() {
        let mock = Arc::new(MockChain::new());
        let source = generate();
        mock.set_balance(source.address(), eth(1));
        let broken = TransferRequest {
            to_address: generate().address(),
            keys: KeyRefs::new(vec!["0x1234".to_string()], vec![]),
            ..Default::default()
        };
        let good = TransferRequest {
            to_address: generate().address(),
            keys: KeyRefs::new(vec![private_key_hex(&source)], vec![]),
            ..Default::default()
        };
        let opts = options("mint_sentinel_runner_badkey", true);
        let summary = run_transfers(mock.clone(), &params(vec![broken, good]), &opts, &ShutdownFlag::new())
            .await
            .unwrap();

        assert_eq!(summary.plans, 1);
        assert!(!summary.interrupted);
        let _ = std::fs::remove_dir_all(&opts.log_dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wallets_is_fatal() {
        let mock = Arc::new(MockChain::new());
        let request = TransferRequest {
            to_address: generate().address(),
            ..Default::default()
        };
        let err = run_transfers(
            mock,
            &params(vec![request]),
            &options("mint_sentinel_runner_none", true),
            &ShutdownFlag::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.downcast_ref::<RunError>(), Some(&RunError::NoWallets("send")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_fee_quote_is_fatal() {
        let mock = Arc::new(MockChain::new());
        mock.set_fee_quote(None);
        let source = generate();
        mock.set_balance(source.address(), eth(1));
        let request = TransferRequest {
            to_address: generate().address(),
            keys: KeyRefs::new(vec![private_key_hex(&source)], vec![]),
            ..Default::default()
        };
        let err = run_transfers(
            mock,
            &params(vec![request]),
            &options("mint_sentinel_runner_fee", true),
            &ShutdownFlag::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.downcast_ref::<RunError>(), Some(&RunError::FeeQuoteUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_execution() {
        let mock = Arc::new(MockChain::new());
        let source = generate();
        mock.set_balance(source.address(), eth(1));
        let request = TransferRequest {
            to_address: generate().address(),
            keys: KeyRefs::new(vec![private_key_hex(&source)], vec![]),
            ..Default::default()
        };
        let shutdown = ShutdownFlag::new();
        shutdown.request();
        let summary = run_transfers(
            mock.clone(),
            &params(vec![request]),
            &options("mint_sentinel_runner_stop", false),
            &shutdown,
        )
        .await
        .unwrap();
        assert!(summary.interrupted);
        assert!(mock.sent().is_empty());
    }
}
