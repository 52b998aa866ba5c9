//! Content-addressed tile archive.
//!
//! # Layout
//!
//! Each archive is a single engine file. Inside it, every namespace (one per
//! `format`/`id`/`scale` combination) is an ordered key-value table holding
//! the coordinate index, per-coordinate headers, deduplicated bodies and their
//! reference counts; see [`keys`] for the exact key layout.
//!
//! # Components
//!
//! - [`HandleRegistry`]: one shared handle per path, opened once
//! - [`Store`]: lifecycle and the point read/write API of one namespace
//! - [`WriteCoalescer`]: per-path queue committing writes in atomic batches
//! - [`ContentStore`]: body dedup and reference counting
//! - [`TileStream`]: ordered pyramid traversal
//!
//! # Example
//!
//! ```ignore
//! use tilestash::store::{HandleRegistry, StoreOptions};
//! use tilestash::tile::{TileCoord, TileHeaders};
//!
//! let registry = HandleRegistry::new();
//! let store = registry.open("world.redb", StoreOptions::default()).await?;
//!
//! store.put_tile(TileCoord::new(0, 0, 0), b"png bytes".to_vec(), TileHeaders::new()).await?;
//! let tile = store.get_tile(TileCoord::new(0, 0, 0)).await?;
//!
//! store.close().await?;
//! ```

mod coalescer;
mod content;
mod engine;
pub mod keys;
mod lifecycle;
mod ops;
mod options;
mod read;
mod registry;
mod stream;

pub use coalescer::{CoalescerConfig, PendingWrite, WriteCoalescer};
pub use content::{decode_count, encode_count, ContentStore};
pub use engine::Engine;
pub use lifecycle::{LifecycleState, Store, TileSource};
pub use ops::{KvRead, KvWrite, Op, OperationSet};
pub use options::{
    StoreOptions, DEFAULT_BATCH_MAX_REQUESTS, DEFAULT_BATCH_WINDOW, DEFAULT_STREAM_PAGE_SIZE,
};
pub use registry::{Handle, HandleRegistry, DEFAULT_HANDLE_CAPACITY};
pub use stream::TileStream;
