//! Node access: client seam, alloy implementation, local wallets.

pub mod alloy_client;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod wallet;

pub use alloy_client::AlloyChainClient;
pub use client::{ChainClient, SharedClient};
