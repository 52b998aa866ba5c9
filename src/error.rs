use std::path::PathBuf;

use thiserror::Error;

use crate::tile::TileCoord;

/// Errors surfaced by tile store operations.
///
/// The type is `Clone` so a single engine failure can be delivered to every
/// caller whose writes were part of the failed flush.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The archive path was never created (read-only open of a missing path)
    #[error("Archive does not exist: {}", path.display())]
    ArchiveMissing { path: PathBuf },

    /// No tile is bound to the coordinate
    #[error("Tile not found: {coord}")]
    TileNotFound { coord: TileCoord },

    /// No info record has been stored
    #[error("Info record not found")]
    InfoNotFound,

    /// A coordinate points at a content hash whose body is absent
    #[error("Content not found: {hash}")]
    ContentNotFound { hash: String },

    /// The stored body does not hash to the recorded content hash
    #[error("Integrity check failed: expected {expected}, body hashes to {actual}")]
    Integrity { expected: String, actual: String },

    /// The engine rejected a write batch; nothing in the batch was applied
    #[error("Write failed: {0}")]
    Write(String),

    /// The archive is locked by another process or a racing promotion
    #[error("Archive is already open elsewhere: {}", path.display())]
    ConcurrentOpenConflict { path: PathBuf },

    /// The archive could not be opened
    #[error("Failed to open archive {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    /// Engine read or transaction failure
    #[error("Storage engine error: {0}")]
    Engine(String),

    /// Coordinate outside the tile grid of its zoom level
    #[error("Invalid tile coordinate: {coord}")]
    InvalidCoordinate { coord: TileCoord },

    /// A caller-supplied content hash is not 32 hex characters
    #[error("Invalid content hash: {0:?}")]
    InvalidContentHash(String),

    /// A stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store has been closed
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Whether this error means "absent" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TileNotFound { .. }
                | StoreError::InfoNotFound
                | StoreError::ContentNotFound { .. }
        )
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Engine(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Engine(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Engine(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Write(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Engine(format!("background task failed: {}", err))
    }
}

/// Errors raised while exporting or importing a pyramid directory.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The store rejected a read or write
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Filesystem access failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }
}
