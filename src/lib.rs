//! Mint Sentinel
//!
//! Fee-competitive transaction tooling for Ethereum: a mempool watcher
//! that tracks competing calls to a contract method, a bounded worker pool
//! with retries, a fee-aware ETH distribution planner with buffer-wallet
//! hops, and a mint orchestrator that outbids observed challengers.

pub mod chain;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod mempool;
pub mod mint;
pub mod tools;
pub mod transfer;
pub mod types;
pub mod units;

// Re-export commonly used types
pub use chain::{AlloyChainClient, ChainClient, SharedClient};
pub use config::{MintParams, ProviderParams, TransferParams};
pub use error::{PlanRejection, RunError, SubmitError};
pub use exec::{run_bounded, RetryPolicy, ShutdownFlag};
pub use types::{ChallengerObservation, FeeQuote, FlushBatch};
