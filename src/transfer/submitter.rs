//! Transaction Submitter
//!
//! Purpose:
//!     Send one transaction (plain transfer or contract call), wait until
//!     it is mined, and log what it cost.
//!
//! Notes:
//!     - maxFeePerGas = (suggested max fee − tip) / 2 / 10 × 15 + tip,
//!       optionally raised to a floor (mint outbid), then capped. The tip
//!       is raised alongside and never sits below the floor's tip.
//!     - Without an explicit value the transfer sweeps: balance − gas × maxFee.
//!     - Fee quote, estimate and broadcast are retried together; an
//!       insufficient-funds result is final.
//!     - Receipt polling has no timeout. Poll errors are logged and polling
//!       continues.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::planner::TransferPlan;
use crate::chain::wallet::{generate, private_key_hex};
use crate::chain::SharedClient;
use crate::error::{is_validation, SubmitError};
use crate::exec::{retry_while, RetryPolicy};
use crate::transfer::wallets::fetch_balance;
use crate::types::{FeeFloor, FeeQuote, GasSettings, MinedReceipt, TxDraft};
use crate::units::{eth_to_wei, gwei_to_wei, wei_to_eth, wei_to_gwei_f64, WEI_PER_GWEI};

/// A liveness line every this many receipt polls.
const POLLS_PER_LIVENESS_LOG: u64 = 30;

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Hard ceiling for maxFeePerGas, wei.
    pub fee_cap_wei: u128,
    /// Optional ceiling for the tip, wei.
    pub priority_cap_wei: Option<u128>,
    pub poll_interval: Duration,
    pub min_confirmations: u64,
    pub retry: RetryPolicy,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            fee_cap_wei: 60 * WEI_PER_GWEI,
            priority_cap_wei: None,
            poll_interval: Duration::from_secs(1),
            min_confirmations: 0,
            retry: RetryPolicy::immediate(3),
        }
    }
}

impl SubmitterConfig {
    pub fn with_fee_cap_gwei(mut self, gwei: rust_decimal::Decimal) -> Result<Self> {
        self.fee_cap_wei = gwei_to_wei(gwei)?;
        Ok(self)
    }
}

/// Pick gas prices from a quote. Returns the settings and whether the cap
/// had to be applied.
pub fn gas_settings(
    quote: &FeeQuote,
    gas_limit: u64,
    config: &SubmitterConfig,
    fee_floor: Option<FeeFloor>,
) -> (GasSettings, bool) {
    let derived = quote.derived_max_fee_per_gas();
    let wanted = fee_floor.map_or(derived, |floor| derived.max(floor.max_fee_per_gas));
    let capped = wanted > config.fee_cap_wei;
    let max_fee_per_gas = wanted.min(config.fee_cap_wei);

    let mut tip = quote.max_priority_fee_per_gas;
    if let Some(floor) = fee_floor {
        // Outbidding needs the tip too, not just the ceiling.
        tip = tip
            .max(floor.max_fee_per_gas.saturating_sub(derived.saturating_sub(tip)))
            .max(floor.max_priority_fee_per_gas);
    }
    if let Some(priority_cap) = config.priority_cap_wei {
        tip = tip.min(priority_cap);
    }
    let settings = GasSettings {
        gas_limit,
        max_fee_per_gas,
        max_priority_fee_per_gas: tip.min(max_fee_per_gas),
    };
    (settings, capped)
}

pub struct TransactionSubmitter {
    client: SharedClient,
    config: SubmitterConfig,
}

impl TransactionSubmitter {
    pub fn new(client: SharedClient, config: SubmitterConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Plain ETH transfer. `value = None` sweeps the wallet.
    pub async fn submit(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: Option<U256>,
    ) -> Result<TxHash> {
        self.submit_call(from, to, value, Bytes::new(), None).await
    }

    /// Transfer or contract call, retried until broadcast, then confirmed.
    pub async fn submit_call(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: Option<U256>,
        input: Bytes,
        fee_floor: Option<FeeFloor>,
    ) -> Result<TxHash> {
        let label = format!("submit {} -> {}", from.address(), to);
        let hash = retry_while(
            self.config.retry,
            &label,
            |e| !is_validation(e),
            || self.prepare_and_broadcast(from, to, value, input.clone(), fee_floor),
        )
        .await?;

        let receipt = self.wait_for_receipt(hash).await;
        self.log_mined(from.address(), to, &receipt).await;
        Ok(hash)
    }

    async fn prepare_and_broadcast(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        value: Option<U256>,
        input: Bytes,
        fee_floor: Option<FeeFloor>,
    ) -> Result<TxHash> {
        let address = from.address();
        let balance = self.client.balance(address).await?;
        let quote = self.client.fee_quote().await.context("fee quote")?;

        let mut draft = TxDraft {
            from: address,
            to,
            value: value.unwrap_or(U256::ZERO),
            input,
        };
        let gas_limit = self.client.estimate_gas(&draft).await.context("gas estimate")?;
        let (gas, capped) = gas_settings(&quote, gas_limit, &self.config, fee_floor);
        let max_fee = U256::from(gas_limit) * U256::from(gas.max_fee_per_gas);
        if capped {
            warn!(
                "Calculated maxFeePerGas is above the cap; using {:.2} gwei (max fee {} ETH)",
                wei_to_gwei_f64(gas.max_fee_per_gas),
                wei_to_eth(max_fee)?
            );
        }

        let insufficient = |needed: U256| SubmitError::InsufficientFunds {
            address,
            balance: balance.to_string(),
            needed: needed.to_string(),
        };
        draft.value = match value {
            Some(v) => v,
            None => balance
                .checked_sub(max_fee)
                .ok_or_else(|| insufficient(max_fee))?,
        };
        if balance < draft.value + max_fee {
            return Err(insufficient(draft.value + max_fee).into());
        }

        info!(
            "Sending {} -> {} | balance={} ETH | value={} ETH | gasLimit={} | maxFee={} ETH",
            address,
            to,
            wei_to_eth(balance)?,
            wei_to_eth(draft.value)?,
            gas_limit,
            wei_to_eth(max_fee)?
        );

        self.client.broadcast(from, &draft, &gas).await
    }

    /// Poll until mined. No timeout.
    pub async fn wait_for_receipt(&self, hash: TxHash) -> MinedReceipt {
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if polls % POLLS_PER_LIVENESS_LOG == 0 {
                debug!("Awaiting {}", hash);
            }
            polls += 1;
            match self.client.receipt(hash, self.config.min_confirmations).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => warn!("receipt({}) poll failed: {:#}", hash, e),
            }
        }
    }

    async fn log_mined(&self, from: Address, to: Address, receipt: &MinedReceipt) {
        if !receipt.success {
            warn!("Transaction {} reverted", receipt.tx_hash);
        }
        let fee = wei_to_eth(U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price))
            .map(|f| f.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let from_balance = fetch_balance(self.client.as_ref(), from, self.config.retry).await;
        let to_balance = fetch_balance(self.client.as_ref(), to, self.config.retry).await;
        info!(
            "Mined {} | block={:?} | effectiveGasPrice={:.2} gwei | fee={} ETH | {} balance: {} | {} balance: {}",
            receipt.tx_hash,
            receipt.block_number,
            wei_to_gwei_f64(receipt.effective_gas_price),
            fee,
            from,
            display_balance(from_balance),
            to,
            display_balance(to_balance)
        );
    }

    /// Run a plan's hops in order; each hop waits for the previous one to
    /// be mined.
    pub async fn execute_plan(&self, plan: &TransferPlan) -> Result<Vec<TxHash>> {
        let mut hashes = Vec::with_capacity(plan.hops.len());
        for (i, hop) in plan.hops.iter().enumerate() {
            let value = hop.value.map(eth_to_wei).transpose()?;
            let hash = self
                .submit(&hop.from, hop.to, value)
                .await
                .with_context(|| {
                    format!(
                        "transfer #{} hop {} {} -> {} (value {})",
                        plan.request_index,
                        i,
                        hop.from.address(),
                        hop.to,
                        hop.value.map(|v| v.to_string()).unwrap_or_else(|| "sweep".into())
                    )
                })?;
            hashes.push(hash);
        }
        Ok(hashes)
    }

    /// Sweep `from` into `to` through `buffers` fresh wallets, one after
    /// another. Returns the final hop's hash.
    pub fn transfer_through_buffers<'a>(
        &'a self,
        from: PrivateKeySigner,
        to: Address,
        buffers: usize,
    ) -> BoxFuture<'a, Result<TxHash>> {
        async move {
            if buffers == 0 {
                return self.submit(&from, to, None).await;
            }
            let buffer = generate();
            info!("Using buffer wallet: {}:{}", private_key_hex(&buffer), buffer.address());
            self.submit(&from, buffer.address(), None).await?;
            self.transfer_through_buffers(buffer, to, buffers - 1).await
        }
        .boxed()
    }
}

fn display_balance(balance: Option<rust_decimal::Decimal>) -> String {
    balance
        .map(|b| format!("{} ETH", b))
        .unwrap_or_else(|| "unknown".to_string())
}
