//! Handle registry for archive paths.
//!
//! The registry provides:
//! - One shared [`Handle`] (engine slot + write coalescer) per path
//! - Singleflight opens, so concurrent opens of a path never race the engine
//! - LRU retention of idle handles, bounded by a capacity
//!
//! Handles still in use, or with writes in flight, are never evicted; the
//! registry may temporarily hold more than its capacity while that is true.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::StoreError;

use super::coalescer::{CoalescerConfig, WriteCoalescer};
use super::engine::Engine;
use super::lifecycle::Store;
use super::options::StoreOptions;

// =============================================================================
// Configuration
// =============================================================================

/// Default number of handles retained.
pub const DEFAULT_HANDLE_CAPACITY: usize = 10;

// =============================================================================
// Handle
// =============================================================================

/// Everything shared by the stores open on one path.
pub struct Handle {
    /// Absolute archive path
    path: PathBuf,

    /// Engine slot
    engine: Arc<Engine>,

    /// Write queue shared by every namespace on the path
    coalescer: WriteCoalescer,

    /// Stores currently open on this handle
    users: AtomicUsize,

    /// Completed compactions
    compactions: AtomicU64,

    /// Written since the last compaction
    dirty: AtomicBool,
}

impl Handle {
    async fn open(path: PathBuf, config: CoalescerConfig) -> Result<Self, StoreError> {
        let engine = Arc::new(Engine::open(path.clone()).await?);
        let coalescer = WriteCoalescer::spawn(&engine, config);
        Ok(Self {
            path,
            engine,
            coalescer,
            users: AtomicUsize::new(0),
            compactions: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn coalescer(&self) -> &WriteCoalescer {
        &self.coalescer
    }

    /// Number of stores currently open on this handle.
    pub fn users(&self) -> usize {
        self.users.load(Ordering::SeqCst)
    }

    /// Number of compactions run on this handle.
    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire(&self) {
        self.users.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of users left.
    pub(crate) fn release(&self) -> usize {
        self.users.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Clear the written flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        self.users() == 0 && self.coalescer.pending() == 0
    }
}

// =============================================================================
// HandleRegistry
// =============================================================================

/// State for an in-flight open.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the open (set before waiters are notified)
    result: Mutex<Option<Result<Arc<Handle>, StoreError>>>,
}

/// Registry of open archive handles.
pub struct HandleRegistry {
    /// Handles by absolute path, most recently used first
    handles: Mutex<LruCache<PathBuf, Arc<Handle>>>,

    /// In-flight opens for singleflight
    in_flight: Mutex<HashMap<PathBuf, Arc<InFlightState>>>,

    /// Idle handles retained
    capacity: usize,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HANDLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Mutex::new(LruCache::unbounded()),
            in_flight: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Open a store on `path`.
    ///
    /// The path is opened read-only; a path that does not exist yields a
    /// store in the missing state, which is created on its first write.
    pub async fn open(
        &self,
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Store, StoreError> {
        let path = absolute(path.as_ref())?;
        let handle = self.handle(&path, CoalescerConfig::from(&options)).await?;
        Ok(Store::new(handle, options))
    }

    /// Get the handle of `path`, opening it if needed.
    async fn handle(&self, path: &Path, config: CoalescerConfig) -> Result<Arc<Handle>, StoreError> {
        // Fast path: already open
        if let Some(handle) = self.handles.lock().await.get(path) {
            return Ok(handle.clone());
        }

        // Slow path: wait for an open in flight or become the leader
        loop {
            let state = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(state) = in_flight.get(path) {
                    state.clone()
                } else {
                    let state = Arc::new(InFlightState {
                        notify: Notify::new(),
                        result: Mutex::new(None),
                    });
                    in_flight.insert(path.to_path_buf(), state.clone());
                    drop(in_flight);

                    let result = self.open_handle(path, config).await;

                    *state.result.lock().await = Some(result.clone());

                    self.in_flight.lock().await.remove(path);
                    state.notify.notify_waiters();

                    return result;
                }
            };

            let notified = state.notify.notified();
            let done = state.result.lock().await.clone();
            if let Some(result) = done {
                return result;
            }
            notified.await;

            let done = state.result.lock().await.clone();
            if let Some(result) = done {
                return result;
            }
        }
    }

    async fn open_handle(&self, path: &Path, config: CoalescerConfig) -> Result<Arc<Handle>, StoreError> {
        // A leader may start right after a previous leader finished
        if let Some(handle) = self.handles.lock().await.get(path) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(Handle::open(path.to_path_buf(), config).await?);

        let mut handles = self.handles.lock().await;
        handles.put(path.to_path_buf(), handle.clone());
        evict_idle(&mut handles, self.capacity);
        Ok(handle)
    }

    /// Drop every idle handle, closing its archive. Returns how many were dropped.
    pub async fn release_idle(&self) -> usize {
        let mut handles = self.handles.lock().await;
        let before = handles.len();
        evict_idle(&mut handles, 0);
        before - handles.len()
    }

    /// Number of handles currently retained.
    pub async fn cached_count(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Whether a handle for `path` is retained.
    pub async fn contains(&self, path: impl AsRef<Path>) -> bool {
        match absolute(path.as_ref()) {
            Ok(path) => self.handles.lock().await.contains(&path),
            Err(_) => false,
        }
    }
}

/// Evict least recently used idle handles until at most `capacity` remain.
///
/// A handle is idle when no store uses it, its write queue is empty and
/// nothing outside the registry still holds it.
fn evict_idle(handles: &mut LruCache<PathBuf, Arc<Handle>>, capacity: usize) {
    while handles.len() > capacity {
        let victim = handles
            .iter()
            .rev()
            .find(|(_, h)| Arc::strong_count(h) == 1 && h.is_idle())
            .map(|(path, _)| path.clone());

        match victim {
            Some(path) => {
                handles.pop(&path);
                debug!(path = %path.display(), "evicted idle archive handle");
            }
            None => break,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, StoreError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================
