//! Mempool Monitor: challenger observation loop
//!
//! Purpose:
//!     Subscribe to pending transaction hashes, keep the ones that call a
//!     watched method on the target contract, and hand the accumulated
//!     fee observations to a `BatchSink` on a fixed cadence.
//!
//! Lifecycle:
//!     Idle ──start()──▶ Running ──stop()──▶ Stopped (terminal)
//!                          └── reconnects exhausted ──▶ Stopped
//!
//! Notes:
//!     - At most `MAX_IN_FLIGHT_LOOKUPS` pending hashes are resolved at
//!       once; fetch failures and non-matching calldata are dropped silently.
//!     - When the subscription stream ends it is re-opened every
//!       `RECONNECT_DELAY`, up to `MAX_RECONNECTS` times. After that the
//!       monitor logs an error, flushes once more and goes to Stopped.
//!     - The flush loop runs once immediately, then sleeps `flush_interval`
//!       after each flush completes (delay, not wall-clock cadence).
//!     - Sink failures are logged; the flush chain keeps going.
//!     - stop() drops lookups still in flight; no further flush is scheduled.

use alloy::primitives::TxHash;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::decoder::WatchFilter;
use crate::chain::SharedClient;
use crate::types::{ChallengerObservation, FlushBatch};

pub const MAX_RECONNECTS: u32 = 50;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const MAX_IN_FLIGHT_LOOKUPS: usize = 64;

/// Consumer of flushed batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, batch: FlushBatch) -> Result<()>;
}

#[async_trait]
impl BatchSink for mpsc::Sender<FlushBatch> {
    async fn deliver(&self, batch: FlushBatch) -> Result<()> {
        self.send(batch)
            .await
            .map_err(|_| anyhow!("batch receiver dropped"))
    }
}

/// Pending observations between two flushes. The lock is never held
/// across an await.
#[derive(Debug, Default)]
pub struct ObservationBuffer {
    inner: Mutex<Vec<ChallengerObservation>>,
}

impl ObservationBuffer {
    pub fn push(&self, observation: ChallengerObservation) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation);
    }

    /// Swap the buffer for an empty one.
    pub fn take(&self) -> Vec<ChallengerObservation> {
        mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

type SharedState = Arc<Mutex<MonitorState>>;

fn read_state(state: &SharedState) -> MonitorState {
    *state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(state: &SharedState, next: MonitorState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

pub struct MempoolMonitor {
    client: SharedClient,
    filter: Arc<WatchFilter>,
    flush_interval: Duration,
    buffer: Arc<ObservationBuffer>,
    state: SharedState,
    stop_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MempoolMonitor {
    pub fn new(client: SharedClient, filter: WatchFilter, flush_interval: Duration) -> Self {
        Self {
            client,
            filter: Arc::new(filter),
            flush_interval,
            buffer: Arc::new(ObservationBuffer::default()),
            state: Arc::new(Mutex::new(MonitorState::Idle)),
            stop_tx: None,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        read_state(&self.state)
    }

    pub fn buffer(&self) -> &Arc<ObservationBuffer> {
        &self.buffer
    }

    pub async fn start(&mut self, sink: Arc<dyn BatchSink>) -> Result<()> {
        let current = self.state();
        if current != MonitorState::Idle {
            bail!("mempool monitor cannot start from {:?}", current);
        }

        let pending = self.client.subscribe_pending_hashes().await?;
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            "Mempool monitor running | contract={} | methods=[{}] | flush every {:?}",
            self.filter.contract_address,
            self.filter.signatures().collect::<Vec<_>>().join(", "),
            self.flush_interval
        );

        set_state(&self.state, MonitorState::Running);
        let events = tokio::spawn(watch_pending(
            self.client.clone(),
            self.filter.clone(),
            self.buffer.clone(),
            pending,
            self.state.clone(),
            stop_rx.clone(),
        ));

        // Flush loop.
        let buffer = self.buffer.clone();
        let interval = self.flush_interval;
        let state = self.state.clone();
        let mut flush_stop = stop_rx;
        let flusher = tokio::spawn(async move {
            loop {
                flush(&buffer, sink.as_ref()).await;
                if read_state(&state) == MonitorState::Stopped {
                    break;
                }
                tokio::select! {
                    _ = flush_stop.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("mempool flush loop exited");
        });

        self.stop_tx = Some(stop_tx);
        self.tasks = vec![events, flusher];
        Ok(())
    }

    /// Stop both loops and drop the subscription. Waits for a flush that
    /// is already running.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("mempool monitor task failed: {}", e);
            }
        }
        if self.state() != MonitorState::Stopped {
            info!("Mempool monitor stopped");
        }
        set_state(&self.state, MonitorState::Stopped);
    }
}

/// Event loop: drain the subscription, re-open it when it ends.
async fn watch_pending(
    client: SharedClient,
    filter: Arc<WatchFilter>,
    buffer: Arc<ObservationBuffer>,
    first: BoxStream<'static, TxHash>,
    state: SharedState,
    mut stop: watch::Receiver<bool>,
) {
    let mut session = Some(first);
    let mut reconnects = 0u32;
    loop {
        if let Some(pending) = session.take() {
            if drain_session(&client, &filter, &buffer, pending, &mut stop).await {
                break;
            }
        }

        reconnects += 1;
        if reconnects > MAX_RECONNECTS {
            error!(
                "Pending transaction subscription lost: {} reconnects exhausted, mempool monitor stopped",
                MAX_RECONNECTS
            );
            set_state(&state, MonitorState::Stopped);
            break;
        }
        warn!(
            "Pending transaction subscription down (reconnect {}/{}), retrying in {:?}",
            reconnects, MAX_RECONNECTS, RECONNECT_DELAY
        );
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        match client.subscribe_pending_hashes().await {
            Ok(pending) => session = Some(pending),
            Err(e) => warn!("Resubscribe failed: {:#}", e),
        }
    }
    debug!("mempool event loop exited");
}

/// Resolve hashes from one subscription until it ends (false) or stop is
/// signalled (true).
async fn drain_session(
    client: &SharedClient,
    filter: &WatchFilter,
    buffer: &ObservationBuffer,
    pending: BoxStream<'static, TxHash>,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    let lookups = pending
        .map(move |hash| handle_pending_hash(client, filter, buffer, hash))
        .buffer_unordered(MAX_IN_FLIGHT_LOOKUPS);
    tokio::pin!(lookups);
    loop {
        tokio::select! {
            _ = stop.changed() => return true,
            next = lookups.next() => {
                if next.is_none() {
                    return false;
                }
            }
        }
    }
}

/// Resolve one pending hash and record it if it is a challenger.
/// Returns true when an observation was appended.
pub async fn handle_pending_hash(
    client: &SharedClient,
    filter: &WatchFilter,
    buffer: &ObservationBuffer,
    hash: TxHash,
) -> bool {
    let tx = match client.transaction_by_hash(hash).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            trace!("pending tx {} vanished before fetch", hash);
            return false;
        }
        Err(e) => {
            trace!("pending tx {} fetch failed: {:#}", hash, e);
            return false;
        }
    };

    let Some(signature) = filter.match_call(tx.to, &tx.input) else {
        return false;
    };

    let observation = ChallengerObservation::from_pending(&tx, Utc::now());
    info!(
        "Challenger {} -> {} | tx={} | maxFee={:.2} gwei | tip={:.2} gwei | gasPrice={:.2} gwei",
        observation.address,
        signature,
        hash,
        observation.max_fee_per_gas_gwei,
        observation.max_priority_fee_per_gas_gwei,
        observation.gas_price_gwei
    );
    buffer.push(observation);
    true
}

/// Take everything buffered and deliver it. Empty batches are delivered
/// too so the consumer sees every tick. Returns the batch size.
pub async fn flush(buffer: &ObservationBuffer, sink: &dyn BatchSink) -> usize {
    let observations = buffer.take();
    let count = observations.len();
    let batch = FlushBatch {
        observations,
        flushed_at: Utc::now(),
    };
    if let Err(e) = sink.deliver(batch).await {
        error!("Flush of {} observations failed: {:#}", count, e);
    }
    count
}
