//! The engine handle behind one archive path.
//!
//! A path is either missing (opened read-only before anything created it) or
//! open. Promotion to write mode creates the file when needed; an existing
//! engine handle serves both modes, so promoting it only flips the flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, DatabaseError, StorageError};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

enum EngineState {
    Missing,
    Open { db: Arc<Database>, writable: bool },
}

/// Shared engine slot of one path.
pub struct Engine {
    path: PathBuf,
    state: RwLock<EngineState>,
}

/// Map an engine open failure. `None` means the file does not exist.
fn open_error(path: &Path, err: DatabaseError) -> Option<StoreError> {
    match err {
        DatabaseError::DatabaseAlreadyOpen => Some(StoreError::ConcurrentOpenConflict {
            path: path.to_path_buf(),
        }),
        DatabaseError::Storage(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        other => Some(StoreError::Open {
            path: path.to_path_buf(),
            reason: other.to_string(),
        }),
    }
}

impl Engine {
    /// Open `path` without creating it.
    pub(crate) async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let state = if exists {
            let target = path.clone();
            match tokio::task::spawn_blocking(move || Database::open(target)).await? {
                Ok(db) => EngineState::Open {
                    db: Arc::new(db),
                    writable: false,
                },
                Err(e) => match open_error(&path, e) {
                    Some(err) => return Err(err),
                    None => EngineState::Missing,
                },
            }
        } else {
            EngineState::Missing
        };

        debug!(path = %path.display(), missing = matches!(state, EngineState::Missing), "opened archive");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_missing(&self) -> bool {
        matches!(*self.state.read().await, EngineState::Missing)
    }

    pub async fn is_writable(&self) -> bool {
        matches!(*self.state.read().await, EngineState::Open { writable: true, .. })
    }

    /// Engine handle for reads.
    pub(crate) async fn reader(&self) -> Result<Arc<Database>, StoreError> {
        match &*self.state.read().await {
            EngineState::Open { db, .. } => Ok(db.clone()),
            EngineState::Missing => Err(StoreError::ArchiveMissing {
                path: self.path.clone(),
            }),
        }
    }

    /// Engine handle for writes; the path must have been promoted.
    pub(crate) async fn writer(&self) -> Result<Arc<Database>, StoreError> {
        match &*self.state.read().await {
            EngineState::Open { db, writable: true } => Ok(db.clone()),
            _ => Err(StoreError::Write(format!(
                "archive {} is not open for writing",
                self.path.display()
            ))),
        }
    }

    /// Switch to write mode, creating the archive if it is missing.
    ///
    /// Promotions of one path are serialized by the state lock, so only the
    /// first one ever creates the file.
    pub(crate) async fn promote(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let EngineState::Open { writable, .. } = &mut *state {
            if !*writable {
                *writable = true;
                debug!(path = %self.path.display(), "promoted archive to write mode");
            }
            return Ok(());
        }

        let target = self.path.clone();
        let db = tokio::task::spawn_blocking(move || -> Result<Database, StoreError> {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                    path: target.clone(),
                    reason: e.to_string(),
                })?;
            }
            Database::create(&target).map_err(|e| {
                open_error(&target, e).unwrap_or_else(|| StoreError::Open {
                    path: target.clone(),
                    reason: "archive vanished while being created".to_string(),
                })
            })
        })
        .await??;

        *state = EngineState::Open {
            db: Arc::new(db),
            writable: true,
        };
        debug!(path = %self.path.display(), "created archive");
        Ok(())
    }

    /// Compact the archive file.
    ///
    /// Needs exclusive ownership of the engine handle; returns `Ok(false)`
    /// without compacting while a read or flush still holds it.
    pub(crate) async fn compact(&self) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let EngineState::Open { db, writable } = std::mem::replace(&mut *state, EngineState::Missing)
        else {
            return Ok(false);
        };

        let mut db = match Arc::try_unwrap(db) {
            Ok(db) => db,
            Err(shared) => {
                *state = EngineState::Open {
                    db: shared,
                    writable,
                };
                debug!(path = %self.path.display(), "archive busy, skipping compaction");
                return Ok(false);
            }
        };

        let (db, result) = tokio::task::spawn_blocking(move || {
            let result = db.compact();
            (db, result)
        })
        .await?;

        *state = EngineState::Open {
            db: Arc::new(db),
            writable,
        };
        result
            .map(|_| true)
            .map_err(|e| StoreError::Engine(format!("compaction failed: {}", e)))
    }
}
