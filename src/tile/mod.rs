//! Tile domain types.
//!
//! - [`TileCoord`]: `(z, x, y)` address of a tile slot
//! - [`ContentHash`]: MD5 identity of a tile body
//! - [`TileHeaders`]: lower-cased header document stored with each tile
//! - [`TileInfo`]: store-wide pyramid description
//! - [`tile_range`]: spherical-mercator bounds to tile range conversion

mod coord;
mod info;
mod mercator;

pub use coord::{ContentHash, Tile, TileCoord, TileHeaders, CONTENT_MD5, MAX_ZOOM};
pub use info::{StreamOptions, TileInfo};
pub use mercator::{tile_range, Bounds, TileRange, MAX_LATITUDE};
