//! Soft shutdown signalling.
//!
//! A `ShutdownFlag` is flipped by SIGINT/SIGTERM or by pressing Enter on the
//! terminal. Workers only poll it between items, so anything in flight
//! finishes first. `requested_within` is the "confirm within N ms or
//! continue" gate used between run phases.

use anyhow::Result;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<FlagInner>,
}

#[derive(Debug, Default)]
struct FlagInner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested; finishing in-flight work");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Wait up to `window` for a shutdown request. Returns true if one
    /// arrived (or was already pending), false if the window elapsed.
    pub async fn requested_within(&self, window: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_requested() {
            return true;
        }
        let _ = tokio::time::timeout(window, notified).await;
        self.is_requested()
    }
}

/// Forward SIGINT/SIGTERM into the flag. A second signal exits at once.
pub fn spawn_signal_listener(flag: ShutdownFlag) -> Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(tokio::spawn(async move {
        while let Some(sig) = signals.next().await {
            if flag.is_requested() {
                warn!("Received signal {} again; exiting now", sig);
                std::process::exit(130);
            }
            info!("Received signal {}", sig);
            flag.request();
        }
    }))
}

/// Treat any line on stdin (Enter) as a shutdown request.
///
/// Reads on a plain OS thread: a blocking stdin read inside the runtime
/// would keep it from shutting down until the next line arrives.
pub fn spawn_enter_listener(flag: ShutdownFlag) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-listener".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(_) => flag.request(),
                    Err(e) => {
                        warn!("stdin listener stopped: {}", e);
                        break;
                    }
                }
            }
        })
}
