//! Mempool watcher
//!
//! Purpose:
//!     Detect competing calls to a contract method while they are still
//!     pending and report their fee bids.
//!
//! Architecture:
//!     decoder.rs: WatchFilter, signatures → selectors, calldata shape check
//!     monitor.rs: subscription loop with reconnects, observation buffer,
//!                 timed flush

pub mod decoder;
pub mod monitor;

pub use decoder::WatchFilter;
pub use monitor::{BatchSink, MempoolMonitor, MonitorState, ObservationBuffer};
