//! Unit conversions between wei, gwei and ETH.
//!
//! Chain values travel as `u128`/`U256` wei. Planner arithmetic runs on
//! `rust_decimal::Decimal` ETH so that constraint comparisons are exact.
//! Observed fee data is reported as `f64` gwei for logging and ranking.

use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub const WEI_PER_GWEI: u128 = 1_000_000_000;
pub const ETH_DECIMALS: u32 = 18;

/// Wei → gwei as a float.
pub fn wei_to_gwei_f64(wei: u128) -> f64 {
    wei as f64 / 1e9
}

/// Decimal gwei → wei per gas. Fractions below one wei are truncated.
pub fn gwei_to_wei(gwei: Decimal) -> Result<u128> {
    if gwei.is_sign_negative() {
        return Err(anyhow!("negative gwei value: {}", gwei));
    }
    (gwei * Decimal::from(WEI_PER_GWEI))
        .trunc()
        .to_u128()
        .ok_or_else(|| anyhow!("gwei value out of range: {}", gwei))
}

/// Wei → ETH.
pub fn wei_to_eth(wei: U256) -> Result<Decimal> {
    let raw = u128::try_from(wei).map_err(|_| anyhow!("wei amount exceeds u128: {}", wei))?;
    let raw = i128::try_from(raw).map_err(|_| anyhow!("wei amount exceeds i128: {}", wei))?;
    Decimal::try_from_i128_with_scale(raw, ETH_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|e| anyhow!("wei amount {} not representable: {}", wei, e))
}

/// `gas × price` in wei, as ETH.
pub fn fee_to_eth(gas_limit: u64, price_per_gas: u128) -> Result<Decimal> {
    let fee = U256::from(gas_limit) * U256::from(price_per_gas);
    wei_to_eth(fee)
}

/// ETH → wei. Fails on negative amounts; sub-wei digits are truncated.
pub fn eth_to_wei(eth: Decimal) -> Result<U256> {
    if eth.is_sign_negative() && !eth.is_zero() {
        return Err(anyhow!("negative ETH amount: {}", eth));
    }
    let scale = Decimal::from(10u64.pow(ETH_DECIMALS));
    let wei = eth
        .checked_mul(scale)
        .ok_or_else(|| anyhow!("ETH amount out of range: {}", eth))?
        .trunc()
        .to_u128()
        .ok_or_else(|| anyhow!("ETH amount out of range: {}", eth))?;
    Ok(U256::from(wei))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_gwei_round_trip_for_fee_fields() {
        assert_eq!(wei_to_gwei_f64(50 * WEI_PER_GWEI), 50.0);
        assert_eq!(wei_to_gwei_f64(1_500_000_000), 1.5);
        assert_eq!(gwei_to_wei(dec!(60)).unwrap(), 60 * WEI_PER_GWEI);
        assert_eq!(gwei_to_wei(dec!(0.5)).unwrap(), 500_000_000);
    }

    #[test]
    fn test_eth_conversions_are_exact() {
        let one_eth = U256::from(10u128.pow(18));
        assert_eq!(wei_to_eth(one_eth).unwrap(), dec!(1));
        assert_eq!(eth_to_wei(dec!(0.0001)).unwrap(), U256::from(100_000_000_000_000u128));
        assert_eq!(fee_to_eth(21_000, 60 * WEI_PER_GWEI).unwrap(), dec!(0.00126));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(eth_to_wei(dec!(-0.1)).is_err());
        assert!(gwei_to_wei(dec!(-1)).is_err());
    }
}
