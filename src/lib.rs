//! # tilestash
//!
//! A content-addressed store for map tile pyramids.
//!
//! Tiles are addressed by `(z, x, y)`. Their bodies are stored once per
//! distinct MD5 hash and reference counted, so a pyramid full of identical
//! ocean tiles costs one body. Writes from any number of tasks are coalesced
//! into atomic batches, and whole pyramids can be streamed in coordinate order.
//!
//! ## Architecture
//!
//! - [`tile`] - coordinates, hashes, header documents, info record, mercator math
//! - [`store`] - archive handles, dedup, write coalescing, streaming, lifecycle
//! - [`server`] - Axum-based read-only HTTP access
//! - [`transfer`] - export to and import from `{z}/{x}/{y}` directory trees
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tilestash::{HandleRegistry, StoreOptions, TileCoord, TileHeaders};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tilestash::StoreError> {
//!     let registry = HandleRegistry::new();
//!     let store = registry.open("world.redb", StoreOptions::default()).await?;
//!
//!     store
//!         .put_tile(TileCoord::new(0, 0, 0), b"tile bytes".to_vec(), TileHeaders::new())
//!         .await?;
//!     let tile = store.get_tile(TileCoord::new(0, 0, 0)).await?;
//!     assert_eq!(&tile.data[..], b"tile bytes");
//!
//!     store.close().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod tile;
pub mod transfer;

// Re-export commonly used types
pub use config::{ArchiveArgs, Cli, Command, ExportConfig, ImportConfig, InfoConfig, ServeConfig};
pub use error::{StoreError, TransferError};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use store::{
    HandleRegistry, LifecycleState, PendingWrite, Store, StoreOptions, TileSource, TileStream,
};
pub use tile::{Bounds, ContentHash, StreamOptions, Tile, TileCoord, TileHeaders, TileInfo};
pub use transfer::{export, import, TransferSummary};
