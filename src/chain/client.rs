//! Blockchain client seam.
//!
//! Everything the bot needs from a node goes through `ChainClient`:
//! pending tx subscription, tx/receipt lookup, balances, fee quotes, gas
//! estimation and broadcasting a signed transaction. `AlloyChainClient` is
//! the production implementation; tests use `chain::mock::MockChain`.

use alloy::primitives::{Address, TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::types::{FeeQuote, GasSettings, MinedReceipt, PendingTx, TxDraft};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Stream of pending transaction hashes. Dropping the stream
    /// unsubscribes.
    async fn subscribe_pending_hashes(&self) -> Result<BoxStream<'static, TxHash>>;

    async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<PendingTx>>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn fee_quote(&self) -> Result<FeeQuote>;

    async fn estimate_gas(&self, draft: &TxDraft) -> Result<u64>;

    /// Sign `draft` with `signer` and broadcast it. Nonce and chain id are
    /// filled by the client.
    async fn broadcast(
        &self,
        signer: &PrivateKeySigner,
        draft: &TxDraft,
        gas: &GasSettings,
    ) -> Result<TxHash>;

    /// Receipt once mined with at least `min_confirmations` confirmations
    /// (0 = any mined receipt), `None` while still pending.
    async fn receipt(&self, hash: TxHash, min_confirmations: u64) -> Result<Option<MinedReceipt>>;
}

pub type SharedClient = Arc<dyn ChainClient>;
