//! Execution primitives: retry, bounded worker pool, soft shutdown.

pub mod pool;
pub mod retry;
pub mod shutdown;

pub use pool::run_bounded;
pub use retry::{retry, retry_or, retry_while, RetryPolicy};
pub use shutdown::{spawn_enter_listener, spawn_signal_listener, ShutdownFlag};
