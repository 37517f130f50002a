//! Challenger bookkeeping and the mint fee decision.
//!
//! The monitor flushes every interval; `ChallengerBook` folds each batch
//! into running maxima. Mint workers read the book right before sending,
//! so the latest competing bid is always the one being outbid.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::mempool::BatchSink;
use crate::types::{ChallengerObservation, FeeFloor, FlushBatch};
use crate::units::WEI_PER_GWEI;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChallengerSummary {
    pub batches: usize,
    pub observed: usize,
    /// Observation with the highest maxFeePerGas so far.
    pub top: Option<ChallengerObservation>,
    /// Highest tip seen so far, possibly from a different challenger.
    pub top_priority_fee_gwei: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ChallengerBook {
    state: Mutex<ChallengerSummary>,
}

impl ChallengerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, batch: &FlushBatch) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.batches += 1;
        for obs in &batch.observations {
            state.observed += 1;
            let higher = state
                .top
                .as_ref()
                .map_or(true, |top| obs.max_fee_per_gas_gwei > top.max_fee_per_gas_gwei);
            if higher {
                info!(
                    "New top challenger {} | maxFee={:.2} gwei | tip={:.2} gwei | block={:?}",
                    obs.address, obs.max_fee_per_gas_gwei, obs.max_priority_fee_per_gas_gwei, obs.block_number
                );
                state.top = Some(obs.clone());
            }
            let tip = obs.max_priority_fee_per_gas_gwei;
            if state.top_priority_fee_gwei.map_or(true, |t| tip > t) {
                state.top_priority_fee_gwei = Some(tip);
            }
        }
    }

    pub fn summary(&self) -> ChallengerSummary {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BatchSink for ChallengerBook {
    async fn deliver(&self, batch: FlushBatch) -> Result<()> {
        if !batch.observations.is_empty() {
            debug!("{} challenger observations flushed", batch.observations.len());
        }
        self.record(&batch);
        Ok(())
    }
}

/// Fee inputs for one mint submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeDecision {
    /// `None` when nobody is competing.
    pub floor: Option<FeeFloor>,
    pub challengers: usize,
}

/// Outbid the top challenger by `outbid_wei`, on both the max fee and the
/// tip. Challengers that reported no max fee (legacy gas price only) are
/// ranked by that price.
pub fn decide_fees(summary: &ChallengerSummary, outbid_wei: u128) -> FeeDecision {
    let floor = summary.top.as_ref().map(|top| {
        let bid_gwei = top.max_fee_per_gas_gwei.max(top.gas_price_gwei);
        let tip_gwei = summary.top_priority_fee_gwei.unwrap_or_default();
        FeeFloor {
            max_fee_per_gas: gwei_f64_to_wei(bid_gwei).saturating_add(outbid_wei),
            max_priority_fee_per_gas: gwei_f64_to_wei(tip_gwei).saturating_add(outbid_wei),
        }
    });
    FeeDecision {
        floor,
        challengers: summary.observed,
    }
}

fn gwei_f64_to_wei(gwei: f64) -> u128 {
    if gwei.is_finite() && gwei > 0.0 {
        (gwei * WEI_PER_GWEI as f64).round() as u128
    } else {
        0
    }
}
