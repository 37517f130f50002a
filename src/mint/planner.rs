//! Mint quantity planning.
//!
//! Each wallet named by a task mints as many tokens as its balance allows
//! after the gas reserve and `fromShouldRemainBalance`, clamped to the
//! task's count constraints. Like transfer planning it is synchronous and
//! reserves the spend on the wallet before the next wallet is looked at.

use alloy::signers::local::PrivateKeySigner;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::MintTask;
use crate::error::PlanRejection;
use crate::transfer::{FromWallet, WalletBook};

#[derive(Debug, Clone)]
pub struct MintPlan {
    pub task_index: usize,
    pub signer: PrivateKeySigner,
    pub quantity: u64,
    /// ETH attached to the call: `price × quantity`.
    pub value: Decimal,
}

pub fn plan_mints(
    tasks: &[MintTask],
    wallets: &mut WalletBook,
    price: Decimal,
    fee_reserve: Decimal,
) -> Vec<MintPlan> {
    let mut plans = Vec::new();
    for (task_index, task) in tasks.iter().enumerate() {
        let sources = wallets.resolve(task.keys.private_keys(), task.keys.public_keys());
        if sources.is_empty() {
            debug!("mint #{}: no source wallets", task_index);
            continue;
        }
        for idx in sources {
            let Some(wallet) = wallets.get_mut(idx) else {
                continue;
            };
            match plan_mint_for_wallet(task, task_index, wallet, price, fee_reserve) {
                Ok(plan) => {
                    info!(
                        "mint #{}: {} mints {} for {} ETH",
                        task_index,
                        plan.signer.address(),
                        plan.quantity,
                        plan.value
                    );
                    plans.push(plan);
                }
                Err(rejection) => {
                    info!("mint #{}: skipping {}: {}", task_index, wallet.address(), rejection)
                }
            }
        }
    }
    plans
}

pub fn plan_mint_for_wallet(
    task: &MintTask,
    task_index: usize,
    wallet: &mut FromWallet,
    price: Decimal,
    fee_reserve: Decimal,
) -> Result<MintPlan, PlanRejection> {
    let quantity = size_mint(task, wallet, price, fee_reserve)?;
    let value = price * Decimal::from(quantity);
    if let Some(balance) = wallet.balance() {
        wallet.set_balance(Some(balance - value - fee_reserve));
    }
    Ok(MintPlan {
        task_index,
        signer: wallet.signer.clone(),
        quantity,
        value,
    })
}

fn size_mint(
    task: &MintTask,
    wallet: &FromWallet,
    price: Decimal,
    fee_reserve: Decimal,
) -> Result<u64, PlanRejection> {
    let Some(balance) = wallet.balance() else {
        return Err(PlanRejection::BalanceUnavailable(wallet.address()));
    };
    if let Some(required) = task.from_at_least_balance {
        if balance < required {
            return Err(PlanRejection::BelowFromAtLeastBalance { balance, required });
        }
    }

    let spendable = balance - fee_reserve - task.from_should_remain_balance.unwrap_or_default();
    if spendable.is_sign_negative() {
        return Err(PlanRejection::NothingToMint { spendable, price });
    }

    // Free mints are limited by the task alone.
    let affordable = if price.is_zero() {
        task.should_mint_at_most.or(task.should_mint_exactly).unwrap_or(1)
    } else {
        (spendable / price).floor().to_u64().unwrap_or(u64::MAX)
    };
    let mut quantity = affordable;
    if let Some(at_most) = task.should_mint_at_most {
        quantity = quantity.min(at_most);
    }
    if let Some(exactly) = task.should_mint_exactly {
        quantity = quantity.min(exactly);
    }

    if quantity == 0 {
        return Err(PlanRejection::NothingToMint { spendable, price });
    }
    if let Some(at_least) = task.should_mint_at_least {
        if quantity < at_least {
            return Err(count_violation("shouldMintAtLeast", quantity, at_least));
        }
    }
    if let Some(exactly) = task.should_mint_exactly {
        if quantity != exactly {
            return Err(count_violation("shouldMintExactly", quantity, exactly));
        }
    }
    Ok(quantity)
}

fn count_violation(constraint: &'static str, quantity: u64, limit: u64) -> PlanRejection {
    PlanRejection::Constraint {
        constraint,
        value: Decimal::from(quantity),
        limit: Decimal::from(limit),
    }
}
