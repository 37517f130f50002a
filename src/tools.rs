//! Wallet utilities: balance report over a TSV of addresses and bulk
//! wallet generation.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

use crate::chain::wallet::{generate, private_key_hex};
use crate::chain::SharedClient;
use crate::exec::{run_bounded, RetryPolicy, ShutdownFlag};
use crate::transfer::fetch_balance;

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub address: Address,
    /// `None` when every fetch attempt failed.
    pub balance: Option<Decimal>,
}

/// Addresses from a TSV, one per line. Duplicate lines and blank lines are
/// dropped; the first column that parses as an address is used, so both
/// plain address lists and `privateKey\taddress` wallet files work.
pub fn parse_addresses(contents: &str) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() || !seen.insert(line) {
            continue;
        }
        match line.split('\t').find_map(|col| col.trim().parse::<Address>().ok()) {
            Some(address) => out.push(address),
            None => warn!("No address in line: {:?}", line),
        }
    }
    out
}

pub async fn collect_balances(
    client: &SharedClient,
    addresses: Vec<Address>,
    parallelism: usize,
    shutdown: &ShutdownFlag,
    policy: RetryPolicy,
) -> Result<Vec<BalanceRow>> {
    info!("Fetching balances of {} wallets", addresses.len());
    run_bounded(parallelism, || shutdown.is_requested(), addresses, |address| async move {
        let balance = fetch_balance(client.as_ref(), address, policy).await;
        if balance.is_none() {
            error!("balance({}) failed", address);
        }
        Ok(BalanceRow { address, balance })
    })
    .await
}

/// Sort ascending (unknown balances first) and sum the positive ones.
pub fn sort_and_sum(rows: &mut [BalanceRow]) -> Decimal {
    rows.sort_by(|a, b| a.balance.cmp(&b.balance));
    rows.iter()
        .filter_map(|r| r.balance)
        .filter(|b| b.is_sign_positive() && !b.is_zero())
        .sum()
}

pub fn log_report(rows: &[BalanceRow], sum: Decimal) {
    for row in rows {
        match row.balance {
            Some(balance) => info!(" | {} | {}", row.address, balance),
            None => info!(" | {} | unknown", row.address),
        }
    }
    info!("Sum: {}", sum);
}

pub fn wallet_line(signer: &PrivateKeySigner) -> String {
    format!("{}\t{}", private_key_hex(signer), signer.address())
}

/// Append `count` fresh wallets to `path` as `privateKey\taddress` lines.
pub fn append_wallets(path: &Path, count: usize) -> Result<Vec<Address>> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open wallets file: {:?}", path))?;

    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        let signer = generate();
        writeln!(file, "{}", wallet_line(&signer))?;
        addresses.push(signer.address());
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use alloy::primitives::{address, U256};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const A: Address = address!("00000000000000000000000000000000000000aa");
    const B: Address = address!("00000000000000000000000000000000000000bb");

    #[test]
    fn test_parse_addresses() {
        let text = format!(
            "{a}\n\n{a}\n0xdeadbeef\t{b}\nnot an address\n",
            a = A,
            b = B
        );
        assert_eq!(parse_addresses(&text), vec![A, B]);
    }

    #[test]
    fn test_sort_and_sum() {
        let mut rows = vec![
            BalanceRow { address: A, balance: Some(dec!(2)) },
            BalanceRow { address: B, balance: None },
            BalanceRow { address: Address::ZERO, balance: Some(dec!(0.5)) },
        ];
        assert_eq!(sort_and_sum(&mut rows), dec!(2.5));
        assert_eq!(rows[0].balance, None);
        assert_eq!(rows[2].address, A);
    }

    #[tokio::test]
    async fn test_collect_balances_with_failures() {
        let mock = Arc::new(MockChain::new());
        mock.set_balance(A, U256::from(10u64.pow(18)));
        mock.break_balance(B);
        let client: SharedClient = mock;

        let mut rows = collect_balances(&client, vec![A, B], 50, &ShutdownFlag::new(), RetryPolicy::immediate(1))
            .await
            .unwrap();
        rows.sort_by_key(|r| r.address);
        assert_eq!(rows[0].balance, Some(dec!(1)));
        assert_eq!(rows[1].balance, None);
    }

    #[test]
    fn test_append_wallets() {
        let path = std::env::temp_dir().join("mint_sentinel_wallets_test.tsv");
        let _ = std::fs::remove_file(&path);

        let first = append_wallets(&path, 2).unwrap();
        let second = append_wallets(&path, 1).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert_eq!(parse_addresses(&text), [first, second].concat());

        let _ = std::fs::remove_file(&path);
    }
}
