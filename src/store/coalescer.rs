//! Write coalescing.
//!
//! Every archive path has one coalescer. Writes from any store on the path
//! are queued as intents and committed by a single worker task: the first
//! queued request opens a short window, everything that arrives during it (up
//! to a request limit) is resolved in submission order inside one engine
//! write transaction, and each caller is answered once that transaction
//! commits.
//!
//! Resolving intents against the transaction that commits them is what keeps
//! reference counts exact under concurrency: two puts of the same body, queued
//! together, see each other's count updates instead of racing on a stale read.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use redb::Database;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::tile::{ContentHash, TileCoord, TileHeaders};

use super::content::ContentStore;
use super::engine::Engine;
use super::keys::{headers_key, tile_key, INFO_KEY};
use super::ops::{KvRead, OperationSet, TileTable};
use super::options::StoreOptions;
use super::read::stored_hash;

// =============================================================================
// Intents
// =============================================================================

/// A write as submitted by a store, before it is turned into operations.
#[derive(Debug, Clone)]
pub(crate) enum WriteIntent {
    PutTile {
        namespace: String,
        coord: TileCoord,
        hash: ContentHash,
        data: Bytes,
        headers: TileHeaders,
    },
    DropTile {
        namespace: String,
        coord: TileCoord,
    },
    PutInfo {
        namespace: String,
        info: Vec<u8>,
    },
}

impl WriteIntent {
    fn namespace(&self) -> &str {
        match self {
            WriteIntent::PutTile { namespace, .. }
            | WriteIntent::DropTile { namespace, .. }
            | WriteIntent::PutInfo { namespace, .. } => namespace,
        }
    }
}

/// Release the content a coordinate used to point at.
///
/// A binding whose body is already gone is tolerated so that a damaged
/// coordinate can still be overwritten or dropped.
fn release_previous<R: KvRead + ?Sized>(
    content: &ContentStore<'_, R>,
    coord: TileCoord,
    previous: &ContentHash,
) -> Result<OperationSet, StoreError> {
    match content.release(previous) {
        Err(StoreError::ContentNotFound { hash }) => {
            warn!(%coord, %hash, "tile was bound to missing content");
            Ok(OperationSet::new())
        }
        other => other,
    }
}

/// Turn one intent into operations against the current batch view.
///
/// A precondition failure is returned as an error and contributes nothing to
/// the batch.
pub(crate) fn resolve<R: KvRead + ?Sized>(
    view: &R,
    intent: &WriteIntent,
) -> Result<OperationSet, StoreError> {
    let content = ContentStore::new(view);
    let mut ops = OperationSet::new();

    match intent {
        WriteIntent::PutTile {
            coord,
            hash,
            data,
            headers,
            ..
        } => {
            let key = tile_key(*coord);
            let previous = view.get(&key)?.map(|v| stored_hash(&v)).transpose()?;
            match previous {
                Some(previous) if previous == *hash => {
                    ops.extend(content.rebind(*coord, headers)?);
                }
                previous => {
                    if let Some(previous) = previous {
                        ops.extend(release_previous(&content, *coord, &previous)?);
                    }
                    ops.extend(content.put(*coord, hash, data, headers)?);
                    ops.put(key, hash.as_str());
                }
            }
        }
        WriteIntent::DropTile { coord, .. } => {
            let key = tile_key(*coord);
            let previous = view
                .get(&key)?
                .ok_or(StoreError::TileNotFound { coord: *coord })?;
            ops.extend(release_previous(&content, *coord, &stored_hash(&previous)?)?);
            ops.delete(key);
            ops.delete(headers_key(*coord));
        }
        WriteIntent::PutInfo { info, .. } => {
            ops.put(INFO_KEY, info.clone());
        }
    }

    Ok(ops)
}

/// Resolve and apply a batch inside one write transaction.
///
/// The outer error means the transaction was aborted and nothing was applied.
fn apply_batch(
    db: &Database,
    intents: &[WriteIntent],
) -> Result<Vec<Result<(), StoreError>>, StoreError> {
    let txn = db.begin_write()?;
    let mut results = Vec::with_capacity(intents.len());

    for intent in intents {
        let mut table = txn.open_table(TileTable::new(intent.namespace()))?;
        match resolve(&table, intent) {
            Ok(ops) => {
                ops.apply(&mut table)?;
                results.push(Ok(()));
            }
            Err(e) => results.push(Err(e)),
        }
    }

    txn.commit()?;
    Ok(results)
}

fn into_write_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Write(_) | StoreError::Closed => err,
        other => StoreError::Write(other.to_string()),
    }
}

// =============================================================================
// Pending Write
// =============================================================================

/// Outcome of a queued write.
///
/// Await it with [`PendingWrite::wait`], or hand it to
/// [`PendingWrite::detach`] to stop waiting and only log a failure.
#[must_use = "the write outcome is lost unless the pending write is awaited or detached"]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<(), StoreError>>,
}

impl PendingWrite {
    fn ready(result: Result<(), StoreError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait until the batch holding this write commits or fails.
    pub async fn wait(self) -> Result<(), StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::Closed))
    }

    /// Stop waiting; a failure is logged instead of returned.
    pub fn detach(self) {
        tokio::spawn(async move {
            if let Err(e) = self.wait().await {
                warn!(error = %e, "detached tile write failed");
            }
        });
    }
}

// =============================================================================
// Coalescer
// =============================================================================

/// Flush cadence.
#[derive(Debug, Clone, Copy)]
pub struct CoalescerConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl From<&StoreOptions> for CoalescerConfig {
    fn from(options: &StoreOptions) -> Self {
        Self {
            window: options.batch_window,
            max_requests: options.batch_max_requests.max(1),
        }
    }
}

struct WriteRequest {
    intent: WriteIntent,
    respond: oneshot::Sender<Result<(), StoreError>>,
}

/// Requests accepted but not yet answered.
#[derive(Default)]
struct Backlog {
    queued: AtomicUsize,
    flushes: AtomicU64,
    drained: Notify,
}

impl Backlog {
    fn complete(&self, count: usize) {
        if self.queued.fetch_sub(count, Ordering::SeqCst) == count {
            self.drained.notify_waiters();
        }
    }
}

/// Per-path write queue.
pub struct WriteCoalescer {
    tx: mpsc::UnboundedSender<WriteRequest>,
    backlog: Arc<Backlog>,
}

impl WriteCoalescer {
    /// Start the worker for `engine`.
    ///
    /// The worker only holds a weak reference, so dropping the last owner of
    /// the engine closes the archive even while the worker is parked.
    pub(crate) fn spawn(engine: &Arc<Engine>, config: CoalescerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(Backlog::default());
        tokio::spawn(run(rx, Arc::downgrade(engine), backlog.clone(), config));
        Self { tx, backlog }
    }

    /// Queue an intent.
    pub(crate) fn submit(&self, intent: WriteIntent) -> PendingWrite {
        let (respond, rx) = oneshot::channel();
        self.backlog.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(WriteRequest { intent, respond }).is_err() {
            self.backlog.complete(1);
            return PendingWrite::ready(Err(StoreError::Closed));
        }
        PendingWrite { rx }
    }

    /// Number of requests not yet answered.
    pub fn pending(&self) -> usize {
        self.backlog.queued.load(Ordering::SeqCst)
    }

    /// Number of write transactions committed or attempted so far.
    pub fn flushes(&self) -> u64 {
        self.backlog.flushes.load(Ordering::SeqCst)
    }

    /// Wait until every request queued so far has been answered.
    pub async fn drain(&self) {
        loop {
            let drained = self.backlog.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    engine: Weak<Engine>,
    backlog: Arc<Backlog>,
    config: CoalescerConfig,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        let deadline = Instant::now() + config.window;

        while batch.len() < config.max_requests {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(request)) => batch.push(request),
                Ok(None) | Err(_) => break,
            }
        }

        let count = batch.len();
        flush(&engine, batch).await;
        backlog.flushes.fetch_add(1, Ordering::SeqCst);
        backlog.complete(count);
    }

    debug!("write coalescer stopped");
}

async fn flush(engine: &Weak<Engine>, batch: Vec<WriteRequest>) {
    let (intents, responders): (Vec<_>, Vec<_>) =
        batch.into_iter().map(|r| (r.intent, r.respond)).unzip();

    let outcome = match engine.upgrade() {
        Some(engine) => match engine.writer().await {
            Ok(db) => tokio::task::spawn_blocking(move || apply_batch(&db, &intents))
                .await
                .map_err(StoreError::from)
                .and_then(|r| r),
            Err(e) => Err(e),
        },
        None => Err(StoreError::Closed),
    };

    match outcome {
        Ok(results) => {
            debug!(requests = results.len(), "flushed write batch");
            for (respond, result) in responders.into_iter().zip(results) {
                let _ = respond.send(result);
            }
        }
        Err(e) => {
            let e = into_write_error(e);
            warn!(requests = responders.len(), error = %e, "write batch failed");
            for respond in responders {
                let _ = respond.send(Err(e.clone()));
            }
        }
    }
}
