//! Fee-competitive minting driven by mempool observations.

pub mod fees;
pub mod orchestrator;
pub mod planner;

pub use fees::{decide_fees, ChallengerBook, ChallengerSummary, FeeDecision};
pub use orchestrator::{run_mint, MintRunOptions, MintRunSummary, DEFAULT_MINT_PARALLELISM};
pub use planner::{plan_mints, MintPlan};
