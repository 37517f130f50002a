//! Transfer Planner
//!
//! Purpose:
//!     Turn transfer requests into executable plans: how much each source
//!     wallet sends after reserving gas for every hop, and the hop chain
//!     through fresh buffer wallets.
//!
//! Notes:
//!     - Pure and synchronous. Balance checks and the reservation that
//!       follows happen with no await in between, so two requests sharing
//!       a wallet can never both spend the same funds.
//!     - `value` is what reaches the destination. With N buffers, hop 0
//!       carries `value + N × hop_fee` so each buffer can pay its own gas
//!       and sweep the rest.
//!     - Rejections are per wallet; the request continues with the next one.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::wallets::{BalanceCache, FromWallet, WalletBook};
use crate::chain::wallet::private_key_hex;
use crate::config::TransferRequest;
use crate::error::PlanRejection;
use crate::types::FeeQuote;
use crate::units::fee_to_eth;

/// 0.0001 ETH. Anything smaller is not worth a transaction.
pub const MIN_TRANSFER_ETH: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

#[derive(Debug, Clone)]
pub struct Hop {
    pub from: PrivateKeySigner,
    pub to: Address,
    pub from_buffer: bool,
    /// Explicit amount; `None` sweeps the whole balance minus gas.
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub request_index: usize,
    pub source: Address,
    pub value: Decimal,
    pub hops: Vec<Hop>,
}

/// Gas reserved per hop: `gas_limit × min(derived max fee, cap)`.
pub fn hop_fee_eth(gas_limit: u64, quote: &FeeQuote, cap_wei: u128) -> Result<Decimal> {
    let per_gas = quote.derived_max_fee_per_gas().min(cap_wei);
    fee_to_eth(gas_limit, per_gas)
}

/// Plan every request in order. Accepted plans have already reserved
/// their funds in `wallets` and credited `balances` for the destination.
pub fn plan_transfers(
    requests: &[TransferRequest],
    wallets: &mut WalletBook,
    balances: &BalanceCache,
    hop_fee: Decimal,
    new_buffer: &mut dyn FnMut() -> PrivateKeySigner,
) -> Vec<TransferPlan> {
    let mut plans = Vec::new();
    for (request_index, request) in requests.iter().enumerate() {
        let sources = wallets.resolve(request.keys.private_keys(), request.keys.public_keys());
        if sources.is_empty() {
            debug!("transfer #{}: no source wallets", request_index);
            continue;
        }
        for idx in sources {
            let Some(wallet) = wallets.get_mut(idx) else {
                continue;
            };
            let to_balance = balances.get(request.to_address);
            match plan_for_wallet(request, request_index, wallet, to_balance, hop_fee, new_buffer) {
                Ok(plan) => {
                    balances.credit(request.to_address, plan.value);
                    info!(
                        "transfer #{}: {} -> {} value={} ETH hops={}",
                        request_index,
                        plan.source,
                        request.to_address,
                        plan.value,
                        plan.hops.len()
                    );
                    plans.push(plan);
                }
                Err(rejection) => info!(
                    "transfer #{}: skipping {}: {}",
                    request_index,
                    wallet.address(),
                    rejection
                ),
            }
        }
    }
    plans
}

/// Size, validate and reserve one wallet's transfer, then build its hops.
pub fn plan_for_wallet(
    request: &TransferRequest,
    request_index: usize,
    wallet: &mut FromWallet,
    to_balance: Option<Decimal>,
    hop_fee: Decimal,
    new_buffer: &mut dyn FnMut() -> PrivateKeySigner,
) -> Result<TransferPlan, PlanRejection> {
    let value = size_transfer(request, wallet.address(), wallet.balance(), to_balance, hop_fee)?;
    let buffers = request.buffer_hops();
    let total_fee = hop_fee * Decimal::from(buffers as u64 + 1);

    // Reserve before anything else can look at this wallet.
    if let Some(balance) = wallet.balance() {
        wallet.set_balance(Some(balance - value - total_fee));
    }

    let mut hops = Vec::with_capacity(buffers + 1);
    let mut from = wallet.signer.clone();
    let mut from_buffer = false;
    for _ in 0..buffers {
        let buffer = new_buffer();
        info!(
            "transfer #{}: buffer wallet {}:{}",
            request_index,
            private_key_hex(&buffer),
            buffer.address()
        );
        hops.push(Hop {
            from: from.clone(),
            to: buffer.address(),
            from_buffer,
            value: (!from_buffer).then(|| value + hop_fee * Decimal::from(buffers as u64)),
        });
        from = buffer;
        from_buffer = true;
    }
    hops.push(Hop {
        from,
        to: request.to_address,
        from_buffer,
        value: (!from_buffer).then_some(value),
    });

    Ok(TransferPlan {
        request_index,
        source: wallet.address(),
        value,
        hops,
    })
}

/// Amount that reaches the destination, or why nothing should be sent.
fn size_transfer(
    request: &TransferRequest,
    source: Address,
    balance: Option<Decimal>,
    to_balance: Option<Decimal>,
    hop_fee: Decimal,
) -> Result<Decimal, PlanRejection> {
    let Some(balance) = balance else {
        return Err(PlanRejection::BalanceUnavailable(source));
    };
    if let Some(required) = request.from_at_least_balance {
        if balance < required {
            return Err(PlanRejection::BelowFromAtLeastBalance { balance, required });
        }
    }

    let to_headroom = match request.to_should_remain_balance_at_most {
        Some(limit) => match to_balance {
            Some(current) => Some(limit - current),
            None => return Err(PlanRejection::BalanceUnavailable(request.to_address)),
        },
        None => None,
    };

    let total_fee = hop_fee * Decimal::from(request.buffer_hops() as u64 + 1);
    let mut value = balance - total_fee;
    if let Some(at_most) = request.should_send_at_most {
        value = value.min(at_most);
    }
    if let Some(exactly) = request.should_send_exactly {
        value = value.min(exactly);
    }
    if let Some(headroom) = to_headroom {
        value = value.min(headroom);
    }
    if let Some(remain) = request.from_should_remain_balance {
        value -= remain;
    }

    if value < MIN_TRANSFER_ETH {
        return Err(PlanRejection::BelowMinimum {
            value,
            minimum: MIN_TRANSFER_ETH,
        });
    }
    if value + total_fee > balance {
        return Err(PlanRejection::ExceedsBalance {
            value,
            fees: total_fee,
            balance,
        });
    }
    if let Some(at_least) = request.should_send_at_least {
        if value < at_least {
            return Err(PlanRejection::Constraint {
                constraint: "shouldSendAtLeast",
                value,
                limit: at_least,
            });
        }
    }
    if let Some(at_most) = request.should_send_at_most {
        if value > at_most {
            return Err(PlanRejection::Constraint {
                constraint: "shouldSendAtMost",
                value,
                limit: at_most,
            });
        }
    }
    if let Some(exactly) = request.should_send_exactly {
        if value != exactly {
            return Err(PlanRejection::Constraint {
                constraint: "shouldSendExactly",
                value,
                limit: exactly,
            });
        }
    }
    if let Some(headroom) = to_headroom {
        if value > headroom {
            return Err(PlanRejection::Constraint {
                constraint: "toShouldRemainBalanceAtMost",
                value,
                limit: headroom,
            });
        }
    }
    Ok(value)
}
