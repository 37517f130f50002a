//! Source wallets and the per-run balance cache.
//!
//! `WalletBook` owns one `FromWallet` per distinct private key and indexes
//! it by address, private key and uncompressed public key, so every
//! request that names the same wallet shares one balance.
//!
//! `BalanceCache` holds ETH balances of any address (sources and
//! destinations). A failed fetch is `None`, never a sentinel value.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chain::wallet::{parse_private_key, private_key_hex, public_key_hex};
use crate::chain::{ChainClient, SharedClient};
use crate::exec::{retry_or, run_bounded, RetryPolicy, ShutdownFlag};
use crate::units::wei_to_eth;

pub const BALANCE_REFRESH_PARALLELISM: usize = 50;

#[derive(Debug, Clone)]
pub struct FromWallet {
    pub signer: PrivateKeySigner,
    pub public_key: String,
    balance: Option<Decimal>,
}

impl FromWallet {
    pub fn new(signer: PrivateKeySigner) -> Self {
        let public_key = public_key_hex(&signer);
        Self {
            signer,
            public_key,
            balance: None,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Cached balance; `None` until a refresh succeeds.
    pub fn balance(&self) -> Option<Decimal> {
        self.balance
    }

    pub fn set_balance(&mut self, balance: Option<Decimal>) {
        self.balance = balance;
    }
}

#[derive(Debug, Default)]
pub struct WalletBook {
    wallets: Vec<FromWallet>,
    by_address: HashMap<Address, usize>,
    by_private_key: HashMap<String, usize>,
    by_public_key: HashMap<String, usize>,
}

impl WalletBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet by private key; returns its index. Registering
    /// the same key twice (in any hex spelling) yields the same index.
    pub fn register_private_key(&mut self, key: &str) -> Result<usize> {
        let signer = parse_private_key(key)?;
        let normalized = private_key_hex(&signer);
        if let Some(&idx) = self.by_private_key.get(&normalized) {
            return Ok(idx);
        }
        if let Some(&idx) = self.by_address.get(&signer.address()) {
            return Ok(idx);
        }

        let wallet = FromWallet::new(signer);
        let idx = self.wallets.len();
        self.by_address.insert(wallet.address(), idx);
        self.by_private_key.insert(normalized, idx);
        self.by_public_key
            .insert(wallet.public_key.to_lowercase(), idx);
        self.wallets.push(wallet);
        Ok(idx)
    }

    /// Register the private keys of one task. Keys that do not parse are
    /// logged against the task and skipped. Returns how many were usable.
    pub fn register_task_keys(&mut self, task: &str, index: usize, keys: &[String]) -> usize {
        let mut usable = 0;
        for key in keys {
            match self.register_private_key(key) {
                Ok(_) => usable += 1,
                Err(e) => error!("Skipping private key of {} #{}: {:#}", task, index, e),
            }
        }
        usable
    }

    /// Indexes of the wallets named by `private_keys` then `public_keys`,
    /// distinct, in first-mention order. Public keys can only resolve to
    /// wallets already registered by private key.
    pub fn resolve(&self, private_keys: &[String], public_keys: &[String]) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::new();
        let mut push = |idx: usize| {
            if !out.contains(&idx) {
                out.push(idx);
            }
        };

        for key in private_keys {
            match parse_private_key(key) {
                Ok(signer) => match self.by_private_key.get(&private_key_hex(&signer)) {
                    Some(&idx) => push(idx),
                    None => warn!("Private key for {} is not registered", signer.address()),
                },
                Err(e) => warn!("Skipping unparsable private key: {:#}", e),
            }
        }
        for key in public_keys {
            match self.by_public_key.get(&key.trim().to_lowercase()) {
                Some(&idx) => push(idx),
                None => warn!("No known wallet for public key {}", key),
            }
        }
        out
    }

    pub fn get(&self, idx: usize) -> Option<&FromWallet> {
        self.wallets.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut FromWallet> {
        self.wallets.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FromWallet> {
        self.wallets.iter()
    }

    /// Fetch every wallet's balance with bounded parallelism, then write
    /// the results back. Failed fetches leave the balance unknown.
    /// Returns how many balances are known afterwards.
    pub async fn refresh_balances(
        &mut self,
        client: &SharedClient,
        cache: &BalanceCache,
        parallelism: usize,
        shutdown: &ShutdownFlag,
        policy: RetryPolicy,
    ) -> Result<usize> {
        info!("Collecting balances of {} wallets", self.wallets.len());
        let targets: Vec<(usize, Address)> = self
            .wallets
            .iter()
            .enumerate()
            .map(|(idx, w)| (idx, w.address()))
            .collect();

        let fetched = run_bounded(
            parallelism,
            || shutdown.is_requested(),
            targets,
            |(idx, address)| async move {
                let balance = cache.refresh(client.as_ref(), address, policy).await;
                Ok((idx, address, balance))
            },
        )
        .await?;

        let mut known = 0;
        for (idx, address, balance) in fetched {
            if balance.is_none() {
                error!("balance({}) failed", address);
            } else {
                known += 1;
            }
            self.wallets[idx].set_balance(balance);
        }
        info!("Balances known for {}/{} wallets", known, self.wallets.len());
        Ok(known)
    }
}

/// Address → ETH balance, shared across tasks of one run.
#[derive(Debug, Clone, Default)]
pub struct BalanceCache {
    inner: Arc<DashMap<Address, Decimal>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: Address) -> Option<Decimal> {
        self.inner.get(&address).map(|entry| *entry)
    }

    pub fn insert(&self, address: Address, balance: Decimal) {
        self.inner.insert(address, balance);
    }

    /// Add to a cached balance. Unknown balances stay unknown.
    pub fn credit(&self, address: Address, amount: Decimal) {
        if let Some(mut entry) = self.inner.get_mut(&address) {
            *entry += amount;
        }
    }

    /// Cached balance, fetching (with retries) on a miss.
    pub async fn get_or_fetch(
        &self,
        client: &dyn ChainClient,
        address: Address,
        policy: RetryPolicy,
    ) -> Option<Decimal> {
        if let Some(balance) = self.get(address) {
            return Some(balance);
        }
        self.refresh(client, address, policy).await
    }

    /// Always hit the node; store the result when it succeeds.
    pub async fn refresh(
        &self,
        client: &dyn ChainClient,
        address: Address,
        policy: RetryPolicy,
    ) -> Option<Decimal> {
        let balance = fetch_balance(client, address, policy).await?;
        self.insert(address, balance);
        Some(balance)
    }
}

/// Balance in ETH, `None` once every attempt failed.
pub async fn fetch_balance(
    client: &dyn ChainClient,
    address: Address,
    policy: RetryPolicy,
) -> Option<Decimal> {
    let label = format!("balance({})", address);
    retry_or(policy, &label, None, || async move {
        let wei = client.balance(address).await?;
        Ok(Some(wei_to_eth(wei)?))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::wallet::generate;
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64.pow(18))
    }

    #[test]
    fn test_register_dedupes_by_key_value() {
        let mut book = WalletBook::new();
        let signer = generate();
        let key = private_key_hex(&signer);

        let a = book.register_private_key(&key).unwrap();
        let b = book.register_private_key(key.trim_start_matches("0x")).unwrap();
        assert_eq!(a, b);
        assert_eq!(book.len(), 1);
        assert!(book.register_private_key("zz").is_err());
    }

    #[test]
    fn test_task_keys_skip_unparsable() {
        let mut book = WalletBook::new();
        let good = generate();
        let keys = vec!["0xnot-a-key".to_string(), private_key_hex(&good), String::new()];

        assert_eq!(book.register_task_keys("transfer", 3, &keys), 1);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(0).unwrap().address(), good.address());
    }

    #[test]
    fn test_resolve_by_private_and_public_key() {
        let mut book = WalletBook::new();
        let one = generate();
        let two = generate();
        book.register_private_key(&private_key_hex(&one)).unwrap();
        book.register_private_key(&private_key_hex(&two)).unwrap();

        let resolved = book.resolve(
            &[private_key_hex(&two)],
            &[public_key_hex(&one), public_key_hex(&two), "0x04deadbeef".to_string()],
        );
        assert_eq!(resolved, vec![1, 0]);
        assert_eq!(book.get(0).unwrap().public_key, public_key_hex(&one));
    }

    #[tokio::test]
    async fn test_refresh_marks_failures_unknown() {
        let mock = Arc::new(MockChain::new());
        let mut book = WalletBook::new();
        let rich = generate();
        let broken = generate();
        book.register_private_key(&private_key_hex(&rich)).unwrap();
        book.register_private_key(&private_key_hex(&broken)).unwrap();
        mock.set_balance(rich.address(), eth(2));
        mock.break_balance(broken.address());

        let client: SharedClient = mock.clone();
        let cache = BalanceCache::new();
        let known = book
            .refresh_balances(&client, &cache, 50, &ShutdownFlag::new(), RetryPolicy::immediate(2))
            .await
            .unwrap();

        assert_eq!(known, 1);
        assert_eq!(book.get(0).unwrap().balance(), Some(dec!(2)));
        assert_eq!(book.get(1).unwrap().balance(), None);
        assert_eq!(cache.get(rich.address()), Some(dec!(2)));
    }

    #[tokio::test]
    async fn test_cache_serves_hits_without_fetching() {
        let mock = MockChain::new();
        let address = generate().address();
        let cache = BalanceCache::new();
        cache.insert(address, dec!(0.3));
        mock.break_balance(address);

        assert_eq!(
            cache.get_or_fetch(&mock, address, RetryPolicy::immediate(0)).await,
            Some(dec!(0.3))
        );
        cache.credit(address, dec!(0.2));
        assert_eq!(cache.get(address), Some(dec!(0.5)));

        // Unknown stays unknown.
        let other = generate().address();
        cache.credit(other, dec!(1));
        assert_eq!(cache.get(other), None);
    }
}
