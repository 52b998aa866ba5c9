//! A store: one namespace of one archive path.
//!
//! Stores open read-only and promote themselves to write mode on their first
//! write. Reads go straight to the engine; writes are queued on the path's
//! coalescer. Closing drains the queue and, for the last writer on the path,
//! compacts the archive.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::tile::{ContentHash, StreamOptions, Tile, TileCoord, TileHeaders, TileInfo, CONTENT_MD5};

use super::coalescer::{PendingWrite, WriteIntent};
use super::read::{read_info, read_refcount, read_tile};
use super::registry::{Handle, HandleRegistry};
use super::options::StoreOptions;
use super::stream::TileStream;

/// Where a store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Opened on a path that does not exist yet
    Missing,
    /// Opened for reads only
    ReadOnly,
    /// Promoted by a write
    ReadWrite,
    /// Closed; every operation fails
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Missing => "missing",
            LifecycleState::ReadOnly => "read-only",
            LifecycleState::ReadWrite => "read-write",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read source for tiles and the info record.
///
/// The HTTP layer and the exporter are generic over this trait so they can be
/// driven by something other than an archive.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the tile at `coord`.
    async fn tile(&self, coord: TileCoord) -> Result<Tile, StoreError>;

    /// Fetch the info record.
    async fn info(&self) -> Result<TileInfo, StoreError>;
}

/// A tile store.
pub struct Store {
    handle: Arc<Handle>,
    namespace: String,
    options: StoreOptions,
    promoted: AtomicBool,
    closed: AtomicBool,
}

impl Store {
    pub(crate) fn new(handle: Arc<Handle>, options: StoreOptions) -> Self {
        handle.acquire();
        Self {
            handle,
            namespace: options.namespace(),
            options,
            promoted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a store on `path` through `registry`.
    pub async fn open(
        registry: &HandleRegistry,
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        registry.open(path, options).await
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub(crate) fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    /// Compactions run on this store's archive so far.
    pub fn compactions(&self) -> u64 {
        self.handle.compactions()
    }

    /// Writes queued on this store's archive and not yet committed.
    pub fn pending_writes(&self) -> usize {
        self.handle.coalescer().pending()
    }

    pub async fn state(&self) -> LifecycleState {
        if self.closed.load(Ordering::SeqCst) {
            LifecycleState::Closed
        } else if self.promoted.load(Ordering::SeqCst) {
            LifecycleState::ReadWrite
        } else if self.handle.engine().is_missing().await {
            LifecycleState::Missing
        } else {
            LifecycleState::ReadOnly
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Switch to write mode, creating the archive if it is missing.
    ///
    /// Runs implicitly before the first write; calling it again is a no-op.
    pub async fn open_for_write(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.promoted.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.handle.engine().promote().await?;
        self.handle.mark_dirty();
        self.promoted.store(true, Ordering::SeqCst);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Fetch a tile with its header document.
    ///
    /// The body is checked against its content hash before it is returned.
    pub async fn get_tile(&self, coord: TileCoord) -> Result<Tile, StoreError> {
        self.ensure_open()?;
        coord.validate()?;
        let db = self.handle.engine().reader().await?;
        let namespace = self.namespace.clone();
        tokio::task::spawn_blocking(move || read_tile(&db, &namespace, coord)).await?
    }

    /// Fetch the info record.
    pub async fn get_info(&self) -> Result<TileInfo, StoreError> {
        self.ensure_open()?;
        let db = self.handle.engine().reader().await?;
        let namespace = self.namespace.clone();
        tokio::task::spawn_blocking(move || read_info(&db, &namespace))
            .await??
            .ok_or(StoreError::InfoNotFound)
    }

    /// How many coordinates reference the body with `hash`.
    ///
    /// `None` means no such body is stored.
    pub async fn refcount(&self, hash: &ContentHash) -> Result<Option<u64>, StoreError> {
        self.ensure_open()?;
        let db = self.handle.engine().reader().await?;
        let namespace = self.namespace.clone();
        let hash = hash.clone();
        tokio::task::spawn_blocking(move || read_refcount(&db, &namespace, &hash)).await?
    }

    /// Stream every stored tile inside `options`, in `(z, x, y)` order.
    ///
    /// When an info record exists the window is clamped to it.
    pub fn stream_tiles(&self, options: StreamOptions) -> TileStream {
        if self.closed.load(Ordering::SeqCst) {
            return TileStream::failed(StoreError::Closed);
        }
        TileStream::new(
            self.handle.clone(),
            self.namespace.clone(),
            options,
            self.options.stream_page_size,
        )
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Store a tile and wait until it is committed.
    ///
    /// A `content-md5` header, if supplied, is trusted as the body's hash;
    /// otherwise the hash is computed. Header names are lower-cased.
    pub async fn put_tile(
        &self,
        coord: TileCoord,
        data: impl Into<Bytes>,
        headers: TileHeaders,
    ) -> Result<(), StoreError> {
        self.put_tile_deferred(coord, data, headers).await?.wait().await
    }

    /// Queue a tile write without waiting for the commit.
    pub async fn put_tile_deferred(
        &self,
        coord: TileCoord,
        data: impl Into<Bytes>,
        mut headers: TileHeaders,
    ) -> Result<PendingWrite, StoreError> {
        self.ensure_open()?;
        coord.validate()?;
        let data = data.into();

        let hash = match headers.content_md5() {
            Some(supplied) => ContentHash::parse(supplied)?,
            None => ContentHash::of(&data),
        };
        headers.insert(CONTENT_MD5, hash.as_str());

        self.open_for_write().await?;
        debug!(%coord, %hash, bytes = data.len(), "queued tile write");
        Ok(self.handle.coalescer().submit(WriteIntent::PutTile {
            namespace: self.namespace.clone(),
            coord,
            hash,
            data,
            headers,
        }))
    }

    /// Remove the tile at `coord`, reclaiming its body if nothing else uses it.
    pub async fn drop_tile(&self, coord: TileCoord) -> Result<(), StoreError> {
        self.ensure_open()?;
        coord.validate()?;
        self.open_for_write().await?;
        self.handle
            .coalescer()
            .submit(WriteIntent::DropTile {
                namespace: self.namespace.clone(),
                coord,
            })
            .wait()
            .await
    }

    /// Replace the info record.
    pub async fn put_info(&self, info: &TileInfo) -> Result<(), StoreError> {
        self.ensure_open()?;
        let info = serde_json::to_vec(info)?;
        self.open_for_write().await?;
        self.handle
            .coalescer()
            .submit(WriteIntent::PutInfo {
                namespace: self.namespace.clone(),
                info,
            })
            .wait()
            .await
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Close the store.
    ///
    /// Waits for queued writes to commit. If this is the last store open on
    /// the path, compaction is enabled and any store wrote to the path since
    /// it was last compacted, the archive is compacted before this returns.
    /// Closing again is a no-op.
    pub async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.handle.coalescer().drain().await;
        let remaining = self.handle.release();

        if self.options.compact_on_close && remaining == 0 && self.handle.take_dirty() {
            match self.handle.engine().compact().await {
                Ok(true) => {
                    self.handle.record_compaction();
                    info!(path = %self.path().display(), "compacted archive");
                }
                Ok(false) => self.handle.mark_dirty(),
                Err(e) => {
                    self.handle.mark_dirty();
                    return Err(e);
                }
            }
        }

        debug!(path = %self.path().display(), namespace = %self.namespace, "closed store");
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.handle.release();
        }
    }
}

#[async_trait]
impl TileSource for Store {
    async fn tile(&self, coord: TileCoord) -> Result<Tile, StoreError> {
        self.get_tile(coord).await
    }

    async fn info(&self) -> Result<TileInfo, StoreError> {
        self.get_info().await
    }
}
