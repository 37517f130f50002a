//! `ChainClient` backed by an alloy provider.
//!
//! One `DynProvider` serves both the pending-tx subscription and plain RPC
//! calls. Use a `ws://`/`wss://` (or IPC) URL when the mempool monitor is
//! needed; HTTP is enough for transfers and balance reports.

use alloy::consensus::Transaction as _;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use super::client::ChainClient;
use crate::types::{FeeQuote, GasSettings, MinedReceipt, PendingTx, TxDraft};

pub struct AlloyChainClient {
    provider: DynProvider,
}

impl AlloyChainClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect provider at {}", redact(url)))?
            .erased();
        info!("Provider connected: {}", redact(url));
        Ok(Self { provider })
    }

    fn request_for(draft: &TxDraft) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(draft.from)
            .with_to(draft.to)
            .with_value(draft.value)
            .with_input(draft.input.clone())
    }
}

/// Strip the path (usually an API key) from a provider URL for logging.
fn redact(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let host = rest.split('/').next().unwrap_or(rest);
            format!("{}://{}", &url[..scheme_end], host)
        }
        None => "<provider>".to_string(),
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn subscribe_pending_hashes(&self) -> Result<BoxStream<'static, TxHash>> {
        let sub = self
            .provider
            .subscribe_pending_transactions()
            .await
            .context("newPendingTransactions subscription failed")?;
        Ok(sub.into_stream().boxed())
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<PendingTx>> {
        let Some(tx) = self.provider.get_transaction_by_hash(hash).await? else {
            return Ok(None);
        };
        let dynamic = tx.is_dynamic_fee();
        Ok(Some(PendingTx {
            hash,
            from: alloy::network::TransactionResponse::from(&tx),
            to: tx.to(),
            input: tx.input().clone(),
            gas_price: tx.gas_price(),
            max_fee_per_gas: dynamic.then(|| tx.max_fee_per_gas()),
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas(),
            block_number: tx.block_number,
        }))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn fee_quote(&self) -> Result<FeeQuote> {
        let est = self.provider.estimate_eip1559_fees().await?;
        Ok(FeeQuote {
            max_fee_per_gas: est.max_fee_per_gas,
            max_priority_fee_per_gas: est.max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, draft: &TxDraft) -> Result<u64> {
        Ok(self.provider.estimate_gas(Self::request_for(draft)).await?)
    }

    async fn broadcast(
        &self,
        signer: &PrivateKeySigner,
        draft: &TxDraft,
        gas: &GasSettings,
    ) -> Result<TxHash> {
        let nonce = self
            .provider
            .get_transaction_count(draft.from)
            .pending()
            .await
            .context("nonce lookup failed")?;
        let chain_id = self.provider.get_chain_id().await?;

        let request = Self::request_for(draft)
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas.gas_limit)
            .with_max_fee_per_gas(gas.max_fee_per_gas)
            .with_max_priority_fee_per_gas(gas.max_priority_fee_per_gas);

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| anyhow!("signing failed: {}", e))?;
        let pending = self.provider.send_tx_envelope(envelope).await?;
        let hash = *pending.tx_hash();
        debug!("broadcast {} nonce={} chain={}", hash, nonce, chain_id);
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash, min_confirmations: u64) -> Result<Option<MinedReceipt>> {
        let Some(receipt) = self.provider.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };
        if min_confirmations > 0 {
            let Some(mined_in) = receipt.block_number else {
                return Ok(None);
            };
            let head = self.provider.get_block_number().await?;
            if head.saturating_sub(mined_in) + 1 < min_confirmations {
                return Ok(None);
            }
        }
        Ok(Some(MinedReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            success: ReceiptResponse::status(&receipt),
        }))
    }
}
