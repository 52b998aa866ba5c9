//! Content-addressed bodies with reference counting.
//!
//! Every distinct body is stored once under `data:{hash}`, next to a count of
//! the coordinates bound to it. The store never writes on its own: each call
//! reads through the view of the enclosing batch and returns the operations
//! to merge into it, so a coordinate binding and its count change commit
//! together.

use bytes::Bytes;

use crate::error::StoreError;
use crate::tile::{ContentHash, TileCoord, TileHeaders};

use super::keys::{data_key, headers_key, refcount_key};
use super::ops::{KvRead, OperationSet};

/// Encode a reference count.
pub fn encode_count(count: u64) -> [u8; 8] {
    count.to_be_bytes()
}

/// Decode a reference count.
pub fn decode_count(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Engine(format!("corrupt reference count ({} bytes)", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Dedup bookkeeping over a read view of one namespace.
pub struct ContentStore<'a, R: KvRead + ?Sized> {
    view: &'a R,
}

impl<'a, R: KvRead + ?Sized> ContentStore<'a, R> {
    pub fn new(view: &'a R) -> Self {
        Self { view }
    }

    /// Current reference count of `hash`, `None` when the body is absent.
    pub fn refcount(&self, hash: &ContentHash) -> Result<Option<u64>, StoreError> {
        self.view
            .get(&refcount_key(hash))?
            .map(|v| decode_count(&v))
            .transpose()
    }

    /// Record one more coordinate referencing `hash`.
    ///
    /// The body is written only when no reference exists yet. The header
    /// document is always written for `coord`.
    pub fn put(
        &self,
        coord: TileCoord,
        hash: &ContentHash,
        data: &[u8],
        headers: &TileHeaders,
    ) -> Result<OperationSet, StoreError> {
        let mut ops = OperationSet::new();
        match self.refcount(hash)? {
            Some(count) if count > 0 => {
                ops.put(refcount_key(hash), encode_count(count + 1).to_vec());
            }
            _ => {
                ops.put(data_key(hash), data.to_vec());
                ops.put(refcount_key(hash), encode_count(1).to_vec());
            }
        }
        ops.extend(self.rebind(coord, headers)?);
        Ok(ops)
    }

    /// Replace the header document of `coord` without touching any count.
    pub fn rebind(&self, coord: TileCoord, headers: &TileHeaders) -> Result<OperationSet, StoreError> {
        let mut ops = OperationSet::new();
        ops.put(headers_key(coord), serde_json::to_vec(headers)?);
        Ok(ops)
    }

    /// Drop one reference to `hash`, deleting the body with the last one.
    pub fn release(&self, hash: &ContentHash) -> Result<OperationSet, StoreError> {
        let mut ops = OperationSet::new();
        match self.refcount(hash)? {
            Some(count) if count > 1 => {
                ops.put(refcount_key(hash), encode_count(count - 1).to_vec());
            }
            Some(_) => {
                ops.delete(data_key(hash));
                ops.delete(refcount_key(hash));
            }
            None => {
                return Err(StoreError::ContentNotFound {
                    hash: hash.to_string(),
                })
            }
        }
        Ok(ops)
    }

    /// Fetch a body and check that it still hashes to `hash`.
    pub fn get(&self, hash: &ContentHash) -> Result<Bytes, StoreError> {
        let data = self
            .view
            .get(&data_key(hash))?
            .ok_or_else(|| StoreError::ContentNotFound {
                hash: hash.to_string(),
            })?;
        hash.verify(&data)?;
        Ok(Bytes::from(data))
    }
}
