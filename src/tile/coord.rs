//! Tile addressing and content identity.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Highest zoom level accepted by the store.
pub const MAX_ZOOM: u8 = 30;

/// Header that carries the content hash of a tile body.
pub const CONTENT_MD5: &str = "content-md5";

// =============================================================================
// Tile Coordinate
// =============================================================================

/// A `(zoom, column, row)` address of one tile slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,
    /// Column (0 = west)
    pub x: u32,
    /// Row (0 = north)
    pub y: u32,
}

impl TileCoord {
    /// Create a coordinate without validating it.
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of columns (and rows) in the grid at zoom `z`.
    pub fn grid_size(z: u8) -> u64 {
        1u64 << z
    }

    /// Check that the coordinate lies on the tile grid of its zoom level.
    pub fn validate(&self) -> Result<(), StoreError> {
        let size = Self::grid_size(self.z.min(MAX_ZOOM));
        if self.z > MAX_ZOOM || u64::from(self.x) >= size || u64::from(self.y) >= size {
            return Err(StoreError::InvalidCoordinate { coord: *self });
        }
        Ok(())
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

// =============================================================================
// Content Hash
// =============================================================================

/// MD5 digest of a tile body rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a tile body.
    pub fn of(data: &[u8]) -> Self {
        Self(hex::encode(md5::compute(data).0))
    }

    /// Accept a hash supplied by a caller.
    ///
    /// Surrounding quotes (as in an HTTP ETag) are stripped and the value is
    /// lower-cased. Anything other than 32 hex characters is rejected.
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        let normalized = value.trim().trim_matches('"').to_ascii_lowercase();
        if normalized.len() != 32 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidContentHash(value.to_string()));
        }
        Ok(Self(normalized))
    }

    /// Check that `data` hashes to this value.
    pub fn verify(&self, data: &[u8]) -> Result<(), StoreError> {
        let actual = Self::of(data);
        if actual != *self {
            return Err(StoreError::Integrity {
                expected: self.0.clone(),
                actual: actual.0,
            });
        }
        Ok(())
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tile Headers
// =============================================================================

/// Header document stored alongside a tile.
///
/// Names are case-insensitive and always stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileHeaders(BTreeMap<String, String>);

impl TileHeaders {
    /// Create an empty header document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, lower-casing its name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.to_ascii_lowercase(), value.into())
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The content hash header, if present.
    pub fn content_md5(&self) -> Option<&str> {
        self.get(CONTENT_MD5)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for TileHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

// =============================================================================
// Tile
// =============================================================================

/// A stored tile: its address, header document and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub coord: TileCoord,
    pub headers: TileHeaders,
    pub data: Bytes,
}
