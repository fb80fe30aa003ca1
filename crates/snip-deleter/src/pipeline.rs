use crate::config::PipelineConfig;
use crate::error::PipelineError;
use parking_lot::Mutex;
use snip_core::{with_deadline, BatchDeleter, DeletionRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Stopped,
}

/// Counters since the pipeline was spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Batches handed to the backend successfully.
    pub flushed_batches: u64,
    /// Requests deleted by successful flushes.
    pub flushed_requests: u64,
    /// Requests lost to failed flushes.
    pub dropped_requests: u64,
}

#[derive(Debug, Default)]
struct Counters {
    flushed_batches: AtomicU64,
    flushed_requests: AtomicU64,
    dropped_requests: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_requests: self.flushed_requests.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
        }
    }
}

enum Command {
    Delete(Vec<DeletionRequest>),
    Flush(oneshot::Sender<()>),
}

/// Single-consumer aggregator in front of a [`BatchDeleter`].
///
/// A buffered batch is flushed when it reaches `batch_size`, when the flush
/// timer fires, on [`DeletionPipeline::flush`] and once more during
/// [`DeletionPipeline::shutdown`]. A failed flush is logged and its requests
/// are dropped; nothing is retried.
pub struct DeletionPipeline {
    sender: mpsc::Sender<Command>,
    shutdown: Arc<Notify>,
    state: Mutex<PipelineState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    drain_timeout: Duration,
}

impl DeletionPipeline {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn<D>(deleter: Arc<D>, config: PipelineConfig) -> Self
    where
        D: BatchDeleter + ?Sized,
    {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let shutdown = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());
        let drain_timeout = config.drain_timeout;

        let worker = Worker {
            deleter,
            receiver,
            shutdown: Arc::clone(&shutdown),
            counters: Arc::clone(&counters),
            buffer: Vec::with_capacity(config.batch_size),
            config,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            sender,
            shutdown,
            state: Mutex::new(PipelineState::Running),
            worker: Mutex::new(Some(handle)),
            counters,
            drain_timeout,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Enqueues requests for deletion.
    ///
    /// Waits for channel capacity when the worker is behind. Fails with
    /// [`PipelineError::Closed`] once shutdown has begun.
    pub async fn submit(&self, requests: Vec<DeletionRequest>) -> Result<(), PipelineError> {
        if self.state() != PipelineState::Running {
            return Err(PipelineError::Closed);
        }
        if requests.is_empty() {
            return Ok(());
        }
        self.sender
            .send(Command::Delete(requests))
            .await
            .map_err(|_| PipelineError::Closed)
    }

    pub async fn submit_one(&self, request: DeletionRequest) -> Result<(), PipelineError> {
        self.submit(vec![request]).await
    }

    /// Flushes everything submitted before this call and waits for it.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        if self.state() != PipelineState::Running {
            return Err(PipelineError::Closed);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| PipelineError::Closed)?;
        done_rx.await.map_err(|_| PipelineError::Closed)
    }

    /// Stops accepting requests, flushes what is buffered and waits for the
    /// worker, bounded by the drain timeout.
    ///
    /// On timeout the worker is aborted and its buffer lost. Calling this
    /// again after the first call returns `Ok(())`.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock();
            if *state != PipelineState::Running {
                return Ok(());
            }
            *state = PipelineState::Draining;
        }
        self.shutdown.notify_one();

        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            *self.state.lock() = PipelineState::Stopped;
            return Ok(());
        };

        let result = match tokio::time::timeout(self.drain_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!(stats = ?self.stats(), "deletion pipeline drained");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "deletion worker failed");
                Err(PipelineError::WorkerFailed(e.to_string()))
            }
            Err(_) => {
                handle.abort();
                error!(
                    drain_timeout_ms = self.drain_timeout.as_millis() as u64,
                    "deletion pipeline drain timed out"
                );
                Err(PipelineError::DrainTimeout(self.drain_timeout))
            }
        };

        *self.state.lock() = PipelineState::Stopped;
        result
    }
}

struct Worker<D: ?Sized> {
    deleter: Arc<D>,
    receiver: mpsc::Receiver<Command>,
    shutdown: Arc<Notify>,
    counters: Arc<Counters>,
    buffer: Vec<DeletionRequest>,
    config: PipelineConfig,
}

/// `tokio::time::interval` rejects a zero period.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

impl<D> Worker<D>
where
    D: BatchDeleter + ?Sized,
{
    async fn run(mut self) {
        let period = self.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(Command::Delete(requests)) => {
                        self.buffer.extend(requests);
                        if self.buffer.len() >= self.config.batch_size {
                            self.flush("size").await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.flush("forced").await;
                        let _ = done.send(());
                    }
                    // Every sender is gone.
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush("timer").await;
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }

        self.drain().await;
    }

    /// Takes whatever is still queued and flushes it once.
    async fn drain(&mut self) {
        self.receiver.close();
        let mut waiters = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Delete(requests) => self.buffer.extend(requests),
                Command::Flush(done) => waiters.push(done),
            }
        }

        self.flush("shutdown").await;
        for done in waiters {
            let _ = done.send(());
        }
    }

    async fn flush(&mut self, reason: &'static str) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len() as u64;
        let result = with_deadline(
            self.config.flush_timeout,
            "delete_batch",
            self.deleter.delete_batch(&batch),
        )
        .await;

        match result {
            Ok(()) => {
                self.counters.flushed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.flushed_requests.fetch_add(count, Ordering::Relaxed);
                debug!(count, reason, "flushed deletion batch");
            }
            Err(e) => {
                self.counters.dropped_requests.fetch_add(count, Ordering::Relaxed);
                error!(count, reason, error = %e, "dropping failed deletion batch");
            }
        }
        self.buffer = Vec::with_capacity(self.config.batch_size);
    }
}
