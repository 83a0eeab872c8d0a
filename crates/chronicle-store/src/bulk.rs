//! Bounded asynchronous bulk pipeline in front of an [`IndexStore`].
//!
//! A single queue feeds a pool of worker tasks. Each worker accumulates a
//! local batch and flushes it when the batch is full, when the periodic
//! flush interval elapses, or when the indexer shuts down. Delivery is
//! at-most-once: a rejected enqueue or a failed flush drops events.

use crate::error::StoreError;
use crate::IndexStore;
use chrono::{DateTime, Utc};
use chronicle_core::{ChangeEvent, StoreConfig};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Snapshot of the indexer's observable state.
#[derive(Debug, Clone, Default)]
pub struct IndexerStatus {
    pub running: bool,
    /// Events currently queued, not yet picked up by a worker.
    pub queue_size: usize,
    /// Events delivered to the store in successful flushes.
    pub processed_count: u64,
    /// Events discarded because their flush failed or timed out.
    pub failed_count: u64,
    /// Events rejected at enqueue because the queue was full.
    pub dropped_count: u64,
    pub last_flush: Option<DateTime<Utc>>,
}

struct Shared {
    store: Arc<dyn IndexStore>,
    batch_size: usize,
    flush_interval: Duration,
    request_timeout: Duration,
    status: Mutex<IndexerStatus>,
}

/// The in-process bulk pipeline. One instance per process; create it at
/// setup, [`close`](BulkIndexer::close) it on shutdown.
pub struct BulkIndexer {
    shared: Arc<Shared>,
    /// Dropped on close; workers drain the queue and exit when the channel
    /// closes.
    sender: RwLock<Option<mpsc::Sender<ChangeEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BulkIndexer {
    /// Start the worker pool. The queue holds up to `2 * bulk_size` events.
    pub fn new(store: Arc<dyn IndexStore>, config: &StoreConfig) -> Self {
        let batch_size = config.bulk_size.max(1);
        let num_workers = config.num_workers.max(1);
        let capacity = (batch_size * 2).max(1);

        let shared = Arc::new(Shared {
            store,
            batch_size,
            flush_interval: config.flush_interval(),
            request_timeout: config.request_timeout(),
            status: Mutex::new(IndexerStatus {
                running: true,
                ..IndexerStatus::default()
            }),
        });

        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..num_workers)
            .map(|_| tokio::spawn(worker(shared.clone(), receiver.clone())))
            .collect();

        Self {
            shared,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Non-blocking enqueue; the RPC path never waits on audit ingestion.
    ///
    /// A full queue rejects the event with [`StoreError::QueueFull`] and
    /// counts it as dropped. After [`close`](BulkIndexer::close) every
    /// enqueue fails fast with [`StoreError::Stopped`]. Events without a
    /// primary key are rejected outright.
    pub fn enqueue(&self, event: ChangeEvent) -> Result<(), StoreError> {
        if event.primary_key_str.is_empty() {
            return Err(StoreError::EmptyPrimaryKey);
        }

        let guard = self.sender.read().expect("sender lock poisoned");
        let Some(sender) = guard.as_ref() else {
            return Err(StoreError::Stopped);
        };

        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let mut status = self.shared.status.lock().expect("status lock poisoned");
                status.dropped_count += 1;
                Err(StoreError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(StoreError::Stopped),
        }
    }

    /// Snapshot the current status.
    pub fn status(&self) -> IndexerStatus {
        let mut status = self
            .shared
            .status
            .lock()
            .expect("status lock poisoned")
            .clone();
        if let Some(sender) = self.sender.read().expect("sender lock poisoned").as_ref() {
            status.queue_size = sender.max_capacity() - sender.capacity();
        }
        status
    }

    /// Stop intake, drain the queue, flush every worker's buffer once, and
    /// wait for the workers to exit.
    pub async fn close(&self) {
        {
            let mut guard = self.sender.write().expect("sender lock poisoned");
            guard.take();
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        let mut status = self.shared.status.lock().expect("status lock poisoned");
        status.running = false;
        status.queue_size = 0;
    }
}

async fn worker(shared: Arc<Shared>, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<ChangeEvent>>>) {
    let mut buffer: Vec<ChangeEvent> = Vec::with_capacity(shared.batch_size);
    let mut tick = tokio::time::interval(shared.flush_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = async { receiver.lock().await.recv().await } => {
                match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= shared.batch_size {
                            flush(&shared, &mut buffer).await;
                        }
                    }
                    // Channel closed and drained: final flush, then exit.
                    None => {
                        flush(&shared, &mut buffer).await;
                        return;
                    }
                }
            }
            _ = tick.tick() => {
                if !buffer.is_empty() {
                    flush(&shared, &mut buffer).await;
                }
            }
        }
    }
}

/// Flush the batch with its own timeout, detached from any RPC context.
/// Failures discard the batch; nothing is retried here.
async fn flush(shared: &Shared, buffer: &mut Vec<ChangeEvent>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let batch_len = batch.len() as u64;

    let outcome = tokio::time::timeout(shared.request_timeout, shared.store.bulk_write(&batch)).await;

    let error: Option<String> = match &outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(_) => Some(format!("flush timed out after {:?}", shared.request_timeout)),
    };

    {
        let mut status = shared.status.lock().expect("status lock poisoned");
        status.last_flush = Some(Utc::now());
        if error.is_none() {
            status.processed_count += batch_len;
        } else {
            status.failed_count += batch_len;
        }
    }

    if let Some(error) = error {
        tracing::error!(batch = batch_len, error = %error, "bulk flush failed; batch discarded");
    }
}
