use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use shortstop_core::{Result, ShortCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many buffered codes force an immediate flush.
const DEFAULT_FLUSH_THRESHOLD: usize = 1000;
/// How long a non-empty buffer may wait before the periodic flush.
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
/// Capacity of each per-user queue. A full queue delays the enqueueing task
/// instead of growing without bound.
const QUEUE_CAPACITY: usize = 1024;

/// The sink a [`DelayedDeleter`] commits batches into.
///
/// The PostgreSQL store implements this with its synchronous soft-delete
/// statement; tests use a recording sink.
#[async_trait]
pub trait FlushDeletes: Send + Sync + 'static {
    /// Soft-deletes `shorts` for the user with internal key `user_pk`.
    async fn flush(&self, user_pk: i64, shorts: &[ShortCode]) -> Result<()>;
}

/// Batches per-user delete requests and commits them on size or time
/// triggers.
///
/// One long-lived task and one bounded queue per resolved user key, created
/// atomically on first use, so deletes for a single user are totally
/// ordered while different users proceed independently. A task buffers
/// incoming codes and flushes when the buffer reaches the threshold, when
/// the periodic tick fires with a non-empty buffer, or on shutdown.
///
/// Flush failures are logged and retried on the next trigger; they are
/// never reported to the caller that enqueued the codes, whose call already
/// returned.
pub struct DelayedDeleter {
    flusher: Arc<dyn FlushDeletes>,
    queues: DashMap<i64, mpsc::Sender<ShortCode>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    flush_threshold: usize,
    flush_interval: Duration,
}

impl DelayedDeleter {
    /// Creates a coordinator with the default triggers: 1000 buffered codes
    /// or 2 seconds.
    pub fn new(flusher: Arc<dyn FlushDeletes>) -> Self {
        Self::with_triggers(flusher, DEFAULT_FLUSH_THRESHOLD, DEFAULT_FLUSH_INTERVAL)
    }

    /// Creates a coordinator with explicit flush triggers.
    pub fn with_triggers(
        flusher: Arc<dyn FlushDeletes>,
        flush_threshold: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            flusher,
            queues: DashMap::new(),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            flush_threshold,
            flush_interval,
        }
    }

    /// Accepts `shorts` for eventual deletion on behalf of `user_pk`.
    ///
    /// Returns as soon as the push is scheduled: the codes are handed to a
    /// background task that feeds the user's queue, so the caller never
    /// blocks on the delete commit. After [`shutdown`] the queue is closed
    /// and the codes are dropped with a warning.
    ///
    /// [`shutdown`]: DelayedDeleter::shutdown
    pub fn enqueue(&self, user_pk: i64, shorts: Vec<ShortCode>) {
        // Stopped is terminal: no new workers after shutdown.
        if self.shutdown.is_cancelled() {
            warn!(user_pk, "coordinator stopped, dropping delete request");
            return;
        }

        // DashMap::entry is an atomic create-if-absent: two concurrent first
        // deletes for the same user cannot spawn two workers.
        let sender = self
            .queues
            .entry(user_pk)
            .or_insert_with(|| self.spawn_worker(user_pk))
            .clone();

        tokio::spawn(async move {
            for short in shorts {
                if sender.send(short).await.is_err() {
                    warn!(user_pk, "delete queue closed, dropping pending codes");
                    break;
                }
            }
        });
    }

    fn spawn_worker(&self, user_pk: i64) -> mpsc::Sender<ShortCode> {
        let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);
        let flusher = Arc::clone(&self.flusher);
        let shutdown = self.shutdown.clone();
        let threshold = self.flush_threshold;
        let interval = self.flush_interval;

        debug!(user_pk, "starting delayed delete worker");
        let handle = tokio::spawn(async move {
            let mut buffer: Vec<ShortCode> = Vec::with_capacity(threshold);
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Some(short) => {
                            buffer.push(short);
                            if buffer.len() >= threshold {
                                flush_buffer(flusher.as_ref(), user_pk, &mut buffer).await;
                            }
                        }
                        None => {
                            flush_buffer(flusher.as_ref(), user_pk, &mut buffer).await;
                            return;
                        }
                    },
                    _ = tick.tick() => {
                        if !buffer.is_empty() {
                            flush_buffer(flusher.as_ref(), user_pk, &mut buffer).await;
                        }
                    }
                    _ = shutdown.cancelled() => {
                        // Drain-on-stop: commit what is buffered and what is
                        // already queued instead of silently losing accepted
                        // deletes.
                        while let Ok(short) = receiver.try_recv() {
                            buffer.push(short);
                        }
                        flush_buffer(flusher.as_ref(), user_pk, &mut buffer).await;
                        debug!(user_pk, "delayed delete worker stopped");
                        return;
                    }
                }
            }
        });
        self.workers.lock().push(handle);
        sender
    }

    /// Stops every worker, flushing buffered codes first, and waits for them
    /// to finish. Codes enqueued after this returns are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(%err, "delayed delete worker panicked");
            }
        }
    }
}

async fn flush_buffer(flusher: &dyn FlushDeletes, user_pk: i64, buffer: &mut Vec<ShortCode>) {
    if buffer.is_empty() {
        return;
    }
    match flusher.flush(user_pk, buffer).await {
        Ok(()) => buffer.clear(),
        // Keep the buffer so the next trigger retries the whole batch.
        Err(err) => warn!(user_pk, %err, "delayed delete flush failed, will retry"),
    }
}
