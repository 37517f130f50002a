//! Typed failures that callers match on.
//!
//! Everything else travels as `anyhow::Error` with context attached.
//! Three classes matter for control flow:
//!   - validation (skip the item, keep the batch): `PlanRejection`, `SubmitError`
//!   - transient (retry): any other error returned by the chain client
//!   - fatal (abort the run): `RunError`

use alloy::primitives::Address;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why the planner skipped a source wallet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanRejection {
    #[error("balance of {0} is unknown (refresh failed)")]
    BalanceUnavailable(Address),
    #[error("balance {balance} below required fromAtLeastBalance {required}")]
    BelowFromAtLeastBalance { balance: Decimal, required: Decimal },
    #[error("value {value} below minimum transferable {minimum}")]
    BelowMinimum { value: Decimal, minimum: Decimal },
    #[error("value {value} plus fees {fees} exceeds balance {balance}")]
    ExceedsBalance { value: Decimal, fees: Decimal, balance: Decimal },
    #[error("value {value} violates {constraint} = {limit}")]
    Constraint {
        constraint: &'static str,
        value: Decimal,
        limit: Decimal,
    },
    #[error("spendable {spendable} ETH buys no mint at {price} ETH each")]
    NothingToMint { spendable: Decimal, price: Decimal },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("{address} has insufficient funds: balance {balance} wei, needed {needed} wei")]
    InsufficientFunds {
        address: Address,
        balance: String,
        needed: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("no wallets to {0} from")]
    NoWallets(&'static str),
    #[error("fee quote unavailable")]
    FeeQuoteUnavailable,
}

/// True for errors that must not be retried.
pub fn is_validation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SubmitError>().is_some() || err.downcast_ref::<PlanRejection>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_validation_classification() {
        let insufficient = anyhow::Error::new(SubmitError::InsufficientFunds {
            address: Address::ZERO,
            balance: "1".into(),
            needed: "2".into(),
        })
        .context("submitting hop 0");
        assert!(is_validation(&insufficient));
        assert!(!is_validation(&anyhow!("connection reset")));
    }
}
