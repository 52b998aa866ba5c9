//! Spherical-mercator tile math.
//!
//! Converts a geographic bounding box plus zoom level into the inclusive range
//! of tile columns and rows that cover it, using 256 pixel tiles.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::coord::TileCoord;

/// Pixel size of one tile.
const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the spherical-mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A geographic bounding box in degrees: west, south, east, north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// The whole projected world.
    pub const WORLD: Bounds = Bounds {
        west: -180.0,
        south: -MAX_LATITUDE,
        east: 180.0,
        north: MAX_LATITUDE,
    };

    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Overlap of two boxes, or `None` if they are disjoint.
    pub fn intersect(&self, other: &Bounds) -> Option<Bounds> {
        let bounds = Bounds {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        };
        if bounds.west > bounds.east || bounds.south > bounds.north {
            None
        } else {
            Some(bounds)
        }
    }

    /// Parse `"west,south,east,north"`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid bounds {:?}: {}", value, e))?;

        match parts.as_slice() {
            [w, s, e, n] if w <= e && s <= n => Ok(Bounds::new(*w, *s, *e, *n)),
            [_, _, _, _] => Err(format!("bounds {:?} are inverted", value)),
            _ => Err(format!("bounds {:?} must have four components", value)),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::WORLD
    }
}

impl From<[f64; 4]> for Bounds {
    fn from(b: [f64; 4]) -> Self {
        Bounds::new(b[0], b[1], b[2], b[3])
    }
}

impl From<Bounds> for [f64; 4] {
    fn from(b: Bounds) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

/// Inclusive column/row range at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Whether the range covers `(x, y)`.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

/// Project a longitude/latitude to global pixel coordinates at `zoom`.
fn to_pixels(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let size = TILE_SIZE * TileCoord::grid_size(zoom) as f64;
    let half = size / 2.0;
    let per_degree = size / 360.0;
    let per_radian = size / (2.0 * PI);

    let sin = lat.to_radians().sin().clamp(-0.9999, 0.9999);
    let x = (half + lon * per_degree).round();
    let y = (half + 0.5 * ((1.0 + sin) / (1.0 - sin)).ln() * -per_radian).round();

    (x.clamp(0.0, size), y.clamp(0.0, size))
}

/// Tile columns and rows covering `bounds` at `zoom`.
pub fn tile_range(bounds: &Bounds, zoom: u8) -> TileRange {
    let max_index = (TileCoord::grid_size(zoom) - 1) as f64;
    let (ll_x, ll_y) = to_pixels(bounds.west, bounds.south, zoom);
    let (ur_x, ur_y) = to_pixels(bounds.east, bounds.north, zoom);

    let index = |pixel: f64| (pixel / TILE_SIZE).floor().clamp(0.0, max_index) as u32;

    let x0 = index(ll_x);
    let x1 = index(ur_x - 1.0);
    let y0 = index(ur_y);
    let y1 = index(ll_y - 1.0);

    TileRange {
        min_x: x0.min(x1),
        min_y: y0.min(y1),
        max_x: x0.max(x1),
        max_y: y0.max(y1),
    }
}
