// Core data structures shared by the monitor, planner and submitter.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};

use crate::units::wei_to_gwei_f64;

/// Pending transaction as seen by the mempool monitor.
/// Fee fields are raw wei; absent fields stay `None`.
#[derive(Debug, Clone, Default)]
pub struct PendingTx {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub block_number: Option<u64>,
}

/// A competing call to the watched contract method.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengerObservation {
    pub address: Address,
    pub block_number: Option<u64>,
    pub gas_price_gwei: f64,
    pub max_fee_per_gas_gwei: f64,
    pub max_priority_fee_per_gas_gwei: f64,
    pub observed_at: DateTime<Utc>,
}

impl ChallengerObservation {
    pub fn from_pending(tx: &PendingTx, observed_at: DateTime<Utc>) -> Self {
        Self {
            address: tx.from,
            block_number: tx.block_number,
            gas_price_gwei: wei_to_gwei_f64(tx.gas_price.unwrap_or(0)),
            max_fee_per_gas_gwei: wei_to_gwei_f64(tx.max_fee_per_gas.unwrap_or(0)),
            max_priority_fee_per_gas_gwei: wei_to_gwei_f64(tx.max_priority_fee_per_gas.unwrap_or(0)),
            observed_at,
        }
    }
}

/// Observations accumulated between two flushes.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    pub observations: Vec<ChallengerObservation>,
    pub flushed_at: DateTime<Utc>,
}

/// Network fee estimate in wei per gas.
///
/// `max_fee_per_gas` is the provider's EIP-1559 max fee suggestion
/// (roughly twice the next base fee plus tip), not the raw base fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeQuote {
    /// Conservative max fee: `(max_fee - tip) / 2 / 10 * 15 + tip`.
    ///
    /// Halving recovers the base fee, the 1.5x factor leaves headroom for
    /// a couple of base fee increases without paying the full 2x suggestion.
    pub fn derived_max_fee_per_gas(&self) -> u128 {
        let tip = self.max_priority_fee_per_gas;
        self.max_fee_per_gas.saturating_sub(tip) / 2 / 10 * 15 + tip
    }
}

/// Unsigned transaction body handed to the client for estimation and signing.
#[derive(Debug, Clone)]
pub struct TxDraft {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// Gas parameters chosen by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Lower bounds a submission must meet to outbid the mempool, wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeFloor {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Mined receipt fields the submitter logs.
#[derive(Debug, Clone)]
pub struct MinedReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub success: bool,
}
