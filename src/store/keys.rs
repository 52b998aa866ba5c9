//! Key layout inside one archive namespace.
//!
//! | Key                      | Value                                   |
//! |--------------------------|-----------------------------------------|
//! | `info`                   | info record (JSON)                      |
//! | `tile:{z}/{x}/{y}`       | content hash bound to the coordinate    |
//! | `headers:{z}/{x}/{y}`    | header document of the coordinate (JSON)|
//! | `data:{hash}`            | tile body                               |
//! | `{hash}`                 | reference count (8-byte big-endian)     |
//!
//! Coordinate components are zero-padded (zoom to 2 digits, column and row to
//! 10) so byte order of `tile:` keys equals numeric `(z, x, y)` order and a
//! column can be read with one range scan.

use crate::tile::{ContentHash, TileCoord};

/// Key of the info record.
pub const INFO_KEY: &[u8] = b"info";

const SEPARATOR: char = ':';
const TILE: &str = "tile";
const HEADERS: &str = "headers";
const DATA: &str = "data";
const INFO: &str = "info";

/// A decoded key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Info,
    Tile(TileCoord),
    Headers(TileCoord),
    Data(ContentHash),
    RefCount(ContentHash),
}

impl Key {
    /// Byte form of the key.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Info => INFO_KEY.to_vec(),
            Key::Tile(coord) => tile_key(*coord),
            Key::Headers(coord) => headers_key(*coord),
            Key::Data(hash) => data_key(hash),
            Key::RefCount(hash) => refcount_key(hash),
        }
    }

    /// Parse a key read back from the engine.
    ///
    /// Returns `None` for anything this layout never writes.
    pub fn decode(bytes: &[u8]) -> Option<Key> {
        let text = std::str::from_utf8(bytes).ok()?;
        match text.split_once(SEPARATOR) {
            None if text == INFO => Some(Key::Info),
            None => ContentHash::parse(text).ok().map(Key::RefCount),
            Some((TILE, rest)) => parse_coord(rest).map(Key::Tile),
            Some((HEADERS, rest)) => parse_coord(rest).map(Key::Headers),
            Some((DATA, rest)) => ContentHash::parse(rest).ok().map(Key::Data),
            Some(_) => None,
        }
    }
}

fn coord_suffix(coord: TileCoord) -> String {
    format!("{:02}/{:010}/{:010}", coord.z, coord.x, coord.y)
}

fn parse_coord(value: &str) -> Option<TileCoord> {
    let mut parts = value.split('/');
    let z = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(TileCoord::new(z, x, y))
}

/// `tile:{z}/{x}/{y}`
pub fn tile_key(coord: TileCoord) -> Vec<u8> {
    format!("{}{}{}", TILE, SEPARATOR, coord_suffix(coord)).into_bytes()
}

/// `headers:{z}/{x}/{y}`
pub fn headers_key(coord: TileCoord) -> Vec<u8> {
    format!("{}{}{}", HEADERS, SEPARATOR, coord_suffix(coord)).into_bytes()
}

/// `data:{hash}`
pub fn data_key(hash: &ContentHash) -> Vec<u8> {
    format!("{}{}{}", DATA, SEPARATOR, hash).into_bytes()
}

/// The bare hash.
pub fn refcount_key(hash: &ContentHash) -> Vec<u8> {
    hash.as_str().as_bytes().to_vec()
}
