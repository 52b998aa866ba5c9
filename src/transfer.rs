//! Export a store to a `{z}/{x}/{y}` directory tree and import one back.
//!
//! The tree holds one file per tile named `{dir}/{z}/{x}/{y}{ext}` plus an
//! optional `info.json` at the root.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{StoreError, TransferError};
use crate::store::{PendingWrite, Store};
use crate::tile::{StreamOptions, TileCoord, TileHeaders, TileInfo};

/// Name of the info record inside an exported tree.
pub const INFO_FILE: &str = "info.json";

/// Writes in flight before an import waits for them.
const IMPORT_WINDOW: usize = 1000;

/// What a transfer did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Tiles copied
    pub tiles: usize,
    /// Tiles skipped because they could not be read or written
    pub failed: usize,
    /// Whether an info record was copied
    pub info: bool,
}

fn tile_path(dir: &Path, coord: TileCoord, extension: &str) -> PathBuf {
    dir.join(coord.z.to_string())
        .join(coord.x.to_string())
        .join(format!("{}{}", coord.y, extension))
}

/// Content type implied by a file extension.
fn content_type(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "pbf" | "mvt" => Some("application/x-protobuf"),
        "json" | "geojson" => Some("application/json"),
        _ => None,
    }
}

/// Write every tile in `options` (and the info record, if any) below `dir`.
///
/// `extension` is appended to each file name, e.g. `".png"` or `""`. A tile
/// that fails its integrity check is skipped and counted as failed.
pub async fn export(
    store: &Store,
    options: StreamOptions,
    dir: &Path,
    extension: &str,
) -> Result<TransferSummary, TransferError> {
    let mut summary = TransferSummary::default();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TransferError::io(dir, e))?;

    match store.get_info().await {
        Ok(info) => {
            let path = dir.join(INFO_FILE);
            let json = serde_json::to_vec_pretty(&info).map_err(StoreError::from)?;
            tokio::fs::write(&path, json)
                .await
                .map_err(|e| TransferError::io(&path, e))?;
            summary.info = true;
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let mut stream = store.stream_tiles(options);
    while let Some(item) = stream.next().await {
        let tile = match item {
            Ok(tile) => tile,
            Err(e @ (StoreError::Integrity { .. } | StoreError::ContentNotFound { .. })) => {
                warn!(error = %e, "skipping unreadable tile");
                summary.failed += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let path = tile_path(dir, tile.coord, extension);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }
        tokio::fs::write(&path, &tile.data)
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        summary.tiles += 1;
    }

    info!(tiles = summary.tiles, failed = summary.failed, dir = %dir.display(), "exported pyramid");
    Ok(summary)
}

async fn read_dir_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, TransferError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| TransferError::io(dir, e))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TransferError::io(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            found.push((name.to_string(), entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

async fn settle(pending: &mut Vec<PendingWrite>, summary: &mut TransferSummary) {
    for write in pending.drain(..) {
        match write.wait().await {
            Ok(()) => summary.tiles += 1,
            Err(e) => {
                warn!(error = %e, "tile import failed");
                summary.failed += 1;
            }
        }
    }
}

/// Load a `{z}/{x}/{y}{ext}` tree into `store`.
///
/// Entries whose names are not tile coordinates are ignored. The content type
/// is derived from the file extension when it is a well-known one.
pub async fn import(store: &Store, dir: &Path) -> Result<TransferSummary, TransferError> {
    let mut summary = TransferSummary::default();
    let mut pending = Vec::new();

    for (z_name, z_path) in read_dir_entries(dir).await? {
        let Ok(z) = z_name.parse::<u8>() else {
            continue;
        };
        if !z_path.is_dir() {
            continue;
        }
        for (x_name, x_path) in read_dir_entries(&z_path).await? {
            let Ok(x) = x_name.parse::<u32>() else {
                continue;
            };
            if !x_path.is_dir() {
                continue;
            }
            for (file_name, file_path) in read_dir_entries(&x_path).await? {
                let (stem, extension) = file_name.split_once('.').unwrap_or((file_name.as_str(), ""));
                let Ok(y) = stem.parse::<u32>() else {
                    continue;
                };

                let coord = TileCoord::new(z, x, y);
                let data = tokio::fs::read(&file_path)
                    .await
                    .map_err(|e| TransferError::io(&file_path, e))?;
                let mut headers = TileHeaders::new();
                if let Some(content_type) = content_type(extension) {
                    headers.insert("content-type", content_type);
                }

                match store.put_tile_deferred(coord, Bytes::from(data), headers).await {
                    Ok(write) => pending.push(write),
                    Err(e) => {
                        debug!(%coord, error = %e, "skipping tile");
                        summary.failed += 1;
                    }
                }
                if pending.len() >= IMPORT_WINDOW {
                    settle(&mut pending, &mut summary).await;
                }
            }
        }
    }
    settle(&mut pending, &mut summary).await;

    let info_path = dir.join(INFO_FILE);
    if tokio::fs::try_exists(&info_path).await.unwrap_or(false) {
        let raw = tokio::fs::read(&info_path)
            .await
            .map_err(|e| TransferError::io(&info_path, e))?;
        let info: TileInfo = serde_json::from_slice(&raw).map_err(StoreError::from)?;
        store.put_info(&info).await?;
        summary.info = true;
    }

    info!(tiles = summary.tiles, failed = summary.failed, dir = %dir.display(), "imported pyramid");
    Ok(summary)
}
