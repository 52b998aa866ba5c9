//! Point reads against a read transaction.

use redb::{Database, ReadOnlyTable, ReadTransaction, TableError};

use crate::error::StoreError;
use crate::tile::{ContentHash, Tile, TileCoord, TileHeaders, TileInfo};

use super::content::ContentStore;
use super::keys::{headers_key, tile_key, INFO_KEY};
use super::ops::{KvRead, TileTable};

/// Open a namespace for reading; `None` if nothing was ever written to it.
pub(crate) fn open_table(
    txn: &ReadTransaction,
    namespace: &str,
) -> Result<Option<ReadOnlyTable<&'static [u8], &'static [u8]>>, StoreError> {
    match txn.open_table(TileTable::new(namespace)) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse the content hash stored in a `tile:` entry.
pub(crate) fn stored_hash(value: &[u8]) -> Result<ContentHash, StoreError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| ContentHash::parse(s).ok())
        .ok_or_else(|| StoreError::Engine("corrupt tile index entry".to_string()))
}

/// Join a coordinate with its header document and body.
pub(crate) fn resolve_tile<R: KvRead + ?Sized>(
    view: &R,
    coord: TileCoord,
    hash: &ContentHash,
) -> Result<Tile, StoreError> {
    let headers = match view.get(&headers_key(coord))? {
        Some(raw) => serde_json::from_slice(&raw)?,
        None => TileHeaders::new(),
    };
    let data = ContentStore::new(view).get(hash)?;
    Ok(Tile {
        coord,
        headers,
        data,
    })
}

/// Read one tile.
pub(crate) fn read_tile(db: &Database, namespace: &str, coord: TileCoord) -> Result<Tile, StoreError> {
    let txn = db.begin_read()?;
    let table = open_table(&txn, namespace)?.ok_or(StoreError::TileNotFound { coord })?;
    let hash = KvRead::get(&table, &tile_key(coord))?.ok_or(StoreError::TileNotFound { coord })?;
    resolve_tile(&table, coord, &stored_hash(&hash)?)
}

/// Read the info record, if one was stored.
pub(crate) fn read_info(db: &Database, namespace: &str) -> Result<Option<TileInfo>, StoreError> {
    let txn = db.begin_read()?;
    let Some(table) = open_table(&txn, namespace)? else {
        return Ok(None);
    };
    match KvRead::get(&table, INFO_KEY)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Reference count of a stored body; `None` once it has been reclaimed.
pub(crate) fn read_refcount(
    db: &Database,
    namespace: &str,
    hash: &ContentHash,
) -> Result<Option<u64>, StoreError> {
    let txn = db.begin_read()?;
    match open_table(&txn, namespace)? {
        Some(table) => ContentStore::new(&table).refcount(hash),
        None => Ok(None),
    }
}
