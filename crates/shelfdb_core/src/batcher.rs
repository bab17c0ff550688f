//! Write batcher.
//!
//! All mutations go through one background task fed by a bounded channel.
//! The task collects writes until no new write arrives for the debounce
//! interval or the batch is full, applies the batch to a staged copy of
//! the document tree, persists it with one durable write, and only then
//! publishes the new tree and resolves the waiting callers.
//!
//! Because a single task owns the flush loop, at most one flush is ever in
//! flight and batches are persisted in enqueue order.

use crate::cache::{CacheLayer, ErasedValue};
use crate::config::{BatchConfig, RetryConfig};
use crate::document::{DocumentStore, DocumentTree};
use crate::error::{CoreError, CoreResult};
use crate::stats::RepositoryStats;
use crate::types::{CollectionKey, StorageId};
use parking_lot::Mutex;
use serde_json::Value;
use shelfdb_storage::StorageError;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Test applied to a stored record inside the writer.
///
/// An error fails the write that owns the matcher and leaves its list
/// untouched; the rest of the batch is unaffected.
pub(crate) type RecordMatcher = Box<dyn Fn(&Value) -> CoreResult<bool> + Send + Sync>;

/// A single mutation of the document tree.
///
/// Every variant is evaluated against the staged tree at flush time, after
/// the writes queued ahead of it, so a mutation never overwrites a record
/// it did not see.
pub(crate) enum WriteOp {
    /// Append one record to the end of a list.
    Append {
        collection_key: CollectionKey,
        storage_id: StorageId,
        record: Value,
    },
    /// Overwrite a list.
    Replace {
        collection_key: CollectionKey,
        storage_id: StorageId,
        records: Vec<Value>,
    },
    /// Keep only the records `keep` accepts. Affects the removed records.
    Retain {
        collection_key: CollectionKey,
        storage_id: StorageId,
        keep: RecordMatcher,
    },
    /// Overwrite the first record `select` picks, appending if none does.
    /// Affects one record when an existing record was overwritten.
    UpdateFirst {
        collection_key: CollectionKey,
        storage_id: StorageId,
        record: Value,
        select: RecordMatcher,
    },
}

/// What applying a [`WriteOp`] did to the staged tree.
#[derive(Debug, Clone, Copy)]
struct Applied {
    affected: usize,
    changed: bool,
}

impl WriteOp {
    fn apply(&self, tree: &mut DocumentTree) -> CoreResult<Applied> {
        match self {
            Self::Append {
                collection_key,
                storage_id,
                record,
            } => {
                list_mut(tree, collection_key, storage_id).push(record.clone());
                Ok(Applied {
                    affected: 1,
                    changed: true,
                })
            }
            Self::Replace {
                collection_key,
                storage_id,
                records,
            } => {
                *list_mut(tree, collection_key, storage_id) = records.clone();
                Ok(Applied {
                    affected: records.len(),
                    changed: true,
                })
            }
            Self::Retain {
                collection_key,
                storage_id,
                keep,
            } => {
                let Some(list) = tree
                    .get_mut(collection_key)
                    .and_then(|by_sid| by_sid.get_mut(storage_id))
                else {
                    return Ok(Applied {
                        affected: 0,
                        changed: false,
                    });
                };
                let mut kept = Vec::with_capacity(list.len());
                for record in list.iter() {
                    if keep(record)? {
                        kept.push(record.clone());
                    }
                }
                let removed = list.len() - kept.len();
                if removed > 0 {
                    *list = kept;
                }
                Ok(Applied {
                    affected: removed,
                    changed: removed > 0,
                })
            }
            Self::UpdateFirst {
                collection_key,
                storage_id,
                record,
                select,
            } => {
                let mut position = None;
                if let Some(list) = tree
                    .get(collection_key)
                    .and_then(|by_sid| by_sid.get(storage_id))
                {
                    for (index, existing) in list.iter().enumerate() {
                        if select(existing)? {
                            position = Some(index);
                            break;
                        }
                    }
                }
                let list = list_mut(tree, collection_key, storage_id);
                let affected = match position {
                    Some(index) => {
                        list[index] = record.clone();
                        1
                    }
                    None => {
                        list.push(record.clone());
                        0
                    }
                };
                Ok(Applied {
                    affected,
                    changed: true,
                })
            }
        }
    }

    fn prefix(&self) -> (&StorageId, &CollectionKey) {
        match self {
            Self::Append {
                collection_key,
                storage_id,
                ..
            }
            | Self::Replace {
                collection_key,
                storage_id,
                ..
            }
            | Self::Retain {
                collection_key,
                storage_id,
                ..
            }
            | Self::UpdateFirst {
                collection_key,
                storage_id,
                ..
            } => (storage_id, collection_key),
        }
    }

    /// Records written by this op when it changes the tree.
    fn written(&self) -> u64 {
        match self {
            Self::Append { .. } | Self::UpdateFirst { .. } => 1,
            Self::Replace { records, .. } => records.len() as u64,
            Self::Retain { .. } => 0,
        }
    }

    /// Appends wait out the debounce; every other op flushes at once.
    fn forces_flush(&self) -> bool {
        !matches!(self, Self::Append { .. })
    }
}

fn list_mut<'a>(
    tree: &'a mut DocumentTree,
    collection_key: &CollectionKey,
    storage_id: &StorageId,
) -> &'a mut Vec<Value> {
    tree.entry(collection_key.clone())
        .or_default()
        .entry(storage_id.clone())
        .or_default()
}

struct WriteRequest {
    op: WriteOp,
    ack: oneshot::Sender<CoreResult<usize>>,
}

enum Message {
    Write(WriteRequest),
    Flush(oneshot::Sender<()>),
}

/// Handle to a queued write.
#[must_use = "a pending write does nothing unless awaited"]
pub(crate) struct PendingWrite {
    rx: oneshot::Receiver<CoreResult<usize>>,
}

impl PendingWrite {
    /// Waits until the write is durable or has failed.
    ///
    /// Returns the number of records the write affected.
    pub(crate) async fn wait(self) -> CoreResult<usize> {
        self.rx.await.map_err(|_| CoreError::RepositoryClosed)?
    }
}

/// Front end of the background writer task.
pub(crate) struct WriteBatcher {
    tx: Mutex<Option<mpsc::Sender<Message>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBatcher {
    /// Starts the writer task on the current runtime.
    ///
    /// A zero batch size or channel capacity is raised to one.
    pub(crate) fn spawn(
        store: Arc<DocumentStore>,
        cache: Arc<CacheLayer<ErasedValue>>,
        stats: Arc<RepositoryStats>,
        mut batch: BatchConfig,
        retry: RetryConfig,
    ) -> Self {
        batch.max_batch_size = batch.max_batch_size.max(1);
        let (tx, rx) = mpsc::channel(batch.channel_capacity.max(1));
        let writer = Writer {
            rx,
            store,
            cache,
            stats,
            batch,
            retry,
            pending: VecDeque::new(),
            flush_waiters: Vec::new(),
            force: false,
            closed: false,
        };
        let handle = tokio::spawn(writer.run());

        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    fn sender(&self) -> CoreResult<mpsc::Sender<Message>> {
        self.tx.lock().clone().ok_or(CoreError::RepositoryClosed)
    }

    async fn send(&self, message: Message) -> CoreResult<()> {
        let tx = self.sender()?;
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => tx
                .send(message)
                .await
                .map_err(|_| CoreError::RepositoryClosed),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CoreError::RepositoryClosed),
        }
    }

    /// Queues `op` and returns a handle resolving when it is durable.
    pub(crate) async fn submit(&self, op: WriteOp) -> CoreResult<PendingWrite> {
        let (ack, rx) = oneshot::channel();
        self.send(Message::Write(WriteRequest { op, ack })).await?;
        Ok(PendingWrite { rx })
    }

    /// Queues `op` and waits for it to become durable.
    pub(crate) async fn enqueue(&self, op: WriteOp) -> CoreResult<usize> {
        self.submit(op).await?.wait().await
    }

    /// Flushes every write queued before this call.
    pub(crate) async fn flush(&self) -> CoreResult<()> {
        let (done, rx) = oneshot::channel();
        self.send(Message::Flush(done)).await?;
        rx.await.map_err(|_| CoreError::RepositoryClosed)
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Closes the queue, drains it, and waits for the writer to exit.
    pub(crate) async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "write batcher task failed");
            }
        }
    }
}

struct Writer {
    rx: mpsc::Receiver<Message>,
    store: Arc<DocumentStore>,
    cache: Arc<CacheLayer<ErasedValue>>,
    stats: Arc<RepositoryStats>,
    batch: BatchConfig,
    retry: RetryConfig,
    pending: VecDeque<WriteRequest>,
    flush_waiters: Vec<oneshot::Sender<()>>,
    force: bool,
    closed: bool,
}

impl Writer {
    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            self.accept(message);
            self.collect_window().await;
            self.flush_all().await;
            if self.closed {
                break;
            }
        }
        self.closed = true;
        self.drain_ready();
        self.flush_all().await;
        debug!("write batcher stopped");
    }

    fn accept(&mut self, message: Message) {
        match message {
            Message::Write(request) => {
                if request.op.forces_flush() {
                    self.force = true;
                }
                self.pending.push_back(request);
            }
            Message::Flush(done) => {
                self.force = true;
                self.flush_waiters.push(done);
            }
        }
    }

    /// Waits for the debounce window to close.
    ///
    /// The sleep is recreated on every arrival, so the window closes only
    /// after a full quiet interval.
    async fn collect_window(&mut self) {
        while !self.force && !self.closed && self.pending.len() < self.batch.max_batch_size {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(message) => self.accept(message),
                    None => self.closed = true,
                },
                () = tokio::time::sleep(self.batch.debounce) => break,
            }
        }
    }

    fn drain_ready(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.accept(message);
        }
    }

    /// Flushes everything queued so far in batches of at most
    /// `max_batch_size`. Writes arriving mid-flush wait for a new window.
    async fn flush_all(&mut self) {
        self.drain_ready();
        while !self.pending.is_empty() {
            let take = self.pending.len().min(self.batch.max_batch_size);
            let batch: Vec<WriteRequest> = self.pending.drain(..take).collect();
            self.flush_batch(batch).await;
        }
        self.force = false;
        for done in self.flush_waiters.drain(..) {
            let _ = done.send(());
        }
    }

    async fn flush_batch(&mut self, batch: Vec<WriteRequest>) {
        let started = Instant::now();
        let mut staged = self.store.stage();
        let mut touched = BTreeSet::new();
        let mut records = 0;
        let mut outcomes = Vec::with_capacity(batch.len());
        for request in &batch {
            let outcome = request.op.apply(&mut staged);
            if let Ok(applied) = &outcome {
                if applied.changed {
                    let (sid, ck) = request.op.prefix();
                    touched.insert((sid.clone(), ck.clone()));
                    records += request.op.written();
                }
            }
            outcomes.push(outcome);
        }

        if touched.is_empty() {
            debug!(writes = batch.len(), "batch left the tree unchanged");
            for (request, outcome) in batch.into_iter().zip(outcomes) {
                let _ = request.ack.send(outcome.map(|applied| applied.affected));
            }
            return;
        }

        let bytes = match self.store.encode(&staged) {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                error!(error = %e, "failed to encode document tree");
                self.stats.record_failed_batch();
                for (request, outcome) in batch.into_iter().zip(outcomes) {
                    let result = match outcome {
                        Ok(_) => Err(CoreError::Codec(e.clone())),
                        Err(own) => Err(own),
                    };
                    let _ = request.ack.send(result);
                }
                return;
            }
        };

        match self.write_with_retry(Arc::clone(&bytes)).await {
            Ok(attempts) => {
                let cache = &self.cache;
                self.store.commit(staged, || {
                    for (sid, ck) in &touched {
                        cache.invalidate_prefix(sid, ck);
                    }
                });
                self.stats.record_flush(bytes.len() as u64);
                self.stats.record_writes(records);
                debug!(
                    writes = batch.len(),
                    bytes = bytes.len(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "batch flushed"
                );
                for (request, outcome) in batch.into_iter().zip(outcomes) {
                    let _ = request.ack.send(outcome.map(|applied| applied.affected));
                }
            }
            Err((attempts, source)) => {
                self.stats.record_failed_batch();
                let source = Arc::new(source);
                for (request, outcome) in batch.into_iter().zip(outcomes) {
                    let result = match outcome {
                        Ok(_) => Err(CoreError::PersistenceFailed {
                            attempts,
                            source: Arc::clone(&source),
                        }),
                        Err(own) => Err(own),
                    };
                    let _ = request.ack.send(result);
                }
            }
        }
    }

    /// Writes `bytes`, retrying with linear backoff.
    ///
    /// Returns the number of attempts used, or the last error.
    async fn write_with_retry(&self, bytes: Arc<Vec<u8>>) -> Result<u32, (u32, StorageError)> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let backend = self.store.backend();
            let data = Arc::clone(&bytes);
            let result =
                tokio::task::spawn_blocking(move || backend.lock().write_document(&data)).await;

            let err = match result {
                Ok(Ok(())) => return Ok(attempt),
                Ok(Err(e)) => e,
                Err(e) => StorageError::Io(std::io::Error::other(e.to_string())),
            };

            if attempt >= max_attempts {
                error!(attempts = attempt, error = %err, "durable write failed, giving up");
                return Err((attempt, err));
            }

            let delay = self.retry.delay_after(attempt);
            self.stats.record_retry();
            warn!(attempt, ?delay, error = %err, "durable write failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
