//! In-memory `ChainClient` for tests.
//!
//! Balances move on broadcast (value plus `gas_limit × max_fee`), receipts
//! appear after a configurable number of polls, and failures can be
//! injected per call kind.

use alloy::primitives::{keccak256, Address, TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::client::ChainClient;
use crate::types::{FeeQuote, GasSettings, MinedReceipt, PendingTx, TxDraft};

#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: TxHash,
    pub signer: Address,
    pub draft: TxDraft,
    pub gas: GasSettings,
}

pub struct MockChain {
    balances: Mutex<HashMap<Address, U256>>,
    txs: Mutex<HashMap<TxHash, PendingTx>>,
    pending_feed: Mutex<Vec<mpsc::UnboundedSender<TxHash>>>,
    subscriptions: AtomicU32,
    dead_feed: AtomicBool,
    fee_quote: Mutex<Option<FeeQuote>>,
    gas_estimate: u64,
    broken_balances: Mutex<HashSet<Address>>,
    broadcast_failures: AtomicU32,
    receipt_delay_polls: AtomicU32,
    receipt_polls: Mutex<HashMap<TxHash, u32>>,
    sent: Mutex<Vec<SentTx>>,
    nonce: AtomicU64,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            txs: Mutex::new(HashMap::new()),
            pending_feed: Mutex::new(Vec::new()),
            subscriptions: AtomicU32::new(0),
            dead_feed: AtomicBool::new(false),
            fee_quote: Mutex::new(Some(FeeQuote {
                max_fee_per_gas: 100_000_000_000,
                max_priority_fee_per_gas: 2_000_000_000,
            })),
            gas_estimate: 21_000,
            broken_balances: Mutex::new(HashSet::new()),
            broadcast_failures: AtomicU32::new(0),
            receipt_delay_polls: AtomicU32::new(0),
            receipt_polls: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        self.balances.lock().unwrap().insert(address, wei);
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.balances.lock().unwrap().get(&address).copied().unwrap_or_default()
    }

    pub fn break_balance(&self, address: Address) {
        self.broken_balances.lock().unwrap().insert(address);
    }

    pub fn set_fee_quote(&self, quote: Option<FeeQuote>) {
        *self.fee_quote.lock().unwrap() = quote;
    }

    pub fn fail_next_broadcasts(&self, n: u32) {
        self.broadcast_failures.store(n, Ordering::SeqCst);
    }

    pub fn delay_receipts(&self, polls: u32) {
        self.receipt_delay_polls.store(polls, Ordering::SeqCst);
    }

    /// Register a transaction body so `transaction_by_hash` can find it.
    pub fn insert_tx(&self, tx: PendingTx) {
        self.txs.lock().unwrap().insert(tx.hash, tx);
    }

    /// Announce a pending hash to every live subscription.
    pub fn announce(&self, hash: TxHash) {
        self.pending_feed
            .lock()
            .unwrap()
            .retain(|feed| feed.send(hash).is_ok());
    }

    /// End every live subscription stream, as a dropped socket would.
    pub fn drop_subscriptions(&self) {
        self.pending_feed.lock().unwrap().clear();
    }

    /// Later subscriptions succeed but end at once.
    pub fn kill_feed(&self) {
        self.dead_feed.store(true, Ordering::SeqCst);
        self.drop_subscriptions();
    }

    /// Total `subscribe_pending_hashes` calls so far.
    pub fn subscriptions(&self) -> u32 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        let mut feeds = self.pending_feed.lock().unwrap();
        feeds.retain(|feed| !feed.is_closed());
        feeds.len()
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn subscribe_pending_hashes(&self) -> Result<BoxStream<'static, TxHash>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.dead_feed.load(Ordering::SeqCst) {
            return Ok(stream::empty().boxed());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending_feed.lock().unwrap().push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<PendingTx>> {
        Ok(self.txs.lock().unwrap().get(&hash).cloned())
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        if self.broken_balances.lock().unwrap().contains(&address) {
            return Err(anyhow!("balance rpc failed for {}", address));
        }
        Ok(self.balance_of(address))
    }

    async fn fee_quote(&self) -> Result<FeeQuote> {
        self.fee_quote
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("fee history unavailable"))
    }

    async fn estimate_gas(&self, _draft: &TxDraft) -> Result<u64> {
        Ok(self.gas_estimate)
    }

    async fn broadcast(
        &self,
        signer: &PrivateKeySigner,
        draft: &TxDraft,
        gas: &GasSettings,
    ) -> Result<TxHash> {
        let remaining = self.broadcast_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.broadcast_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("connection reset"));
        }

        let fee = U256::from(gas.gas_limit) * U256::from(gas.max_fee_per_gas);
        let cost = draft.value + fee;
        {
            let mut balances = self.balances.lock().unwrap();
            let from_balance = balances.get(&draft.from).copied().unwrap_or_default();
            if from_balance < cost {
                return Err(anyhow!("insufficient funds for gas * price + value"));
            }
            balances.insert(draft.from, from_balance - cost);
            *balances.entry(draft.to).or_default() += draft.value;
        }

        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        let hash = keccak256(n.to_be_bytes());
        self.sent.lock().unwrap().push(SentTx {
            hash,
            signer: signer.address(),
            draft: draft.clone(),
            gas: *gas,
        });
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash, _min_confirmations: u64) -> Result<Option<MinedReceipt>> {
        let Some(sent) = self.sent.lock().unwrap().iter().find(|s| s.hash == hash).cloned() else {
            return Ok(None);
        };
        let delay = self.receipt_delay_polls.load(Ordering::SeqCst);
        let mut polls = self.receipt_polls.lock().unwrap();
        let seen = polls.entry(hash).or_insert(0);
        if *seen < delay {
            *seen += 1;
            return Ok(None);
        }
        Ok(Some(MinedReceipt {
            tx_hash: hash,
            block_number: Some(1),
            gas_used: sent.gas.gas_limit,
            effective_gas_price: sent.gas.max_fee_per_gas,
            success: true,
        }))
    }
}
