//! ETH distribution: plan transfers from many source wallets, optionally
//! through fresh buffer wallets, and execute them with bounded parallelism.

pub mod planner;
pub mod queue_log;
pub mod runner;
pub mod submitter;
pub mod wallets;

pub use planner::{hop_fee_eth, plan_transfers, Hop, TransferPlan, MIN_TRANSFER_ETH};
pub use runner::{run_transfers, TransferRunOptions, TransferRunSummary};
pub use submitter::{gas_settings, SubmitterConfig, TransactionSubmitter};
pub use wallets::{fetch_balance, BalanceCache, FromWallet, WalletBook};
