//! The store-wide info record and the window used to stream a pyramid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coord::MAX_ZOOM;
use super::mercator::Bounds;

/// Document describing the whole pyramid.
///
/// Well-known fields are typed; anything else a provider adds is preserved
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TileInfo {
    /// Create an info record for the given scheme and zoom range.
    pub fn new(scheme: impl Into<String>, minzoom: u8, maxzoom: u8) -> Self {
        Self {
            scheme: Some(scheme.into()),
            minzoom: Some(minzoom),
            maxzoom: Some(maxzoom),
            ..Self::default()
        }
    }

    /// Set the bounds.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// The zoom range and extent of a pyramid traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: Bounds,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: MAX_ZOOM,
            bounds: Bounds::WORLD,
        }
    }
}

impl StreamOptions {
    pub fn new(min_zoom: u8, max_zoom: u8, bounds: Bounds) -> Self {
        Self {
            min_zoom,
            max_zoom,
            bounds,
        }
    }

    /// Clamp the window to what the info record says the pyramid contains.
    ///
    /// Returns `None` when nothing is left (zoom ranges or bounds disjoint).
    pub fn restrict(&self, info: &TileInfo) -> Option<StreamOptions> {
        let min_zoom = self.min_zoom.max(info.minzoom.unwrap_or(0));
        let max_zoom = self.max_zoom.min(info.maxzoom.unwrap_or(MAX_ZOOM)).min(MAX_ZOOM);
        let bounds = match &info.bounds {
            Some(b) => self.bounds.intersect(b)?,
            None => self.bounds,
        };

        (min_zoom <= max_zoom).then_some(StreamOptions {
            min_zoom,
            max_zoom,
            bounds,
        })
    }
}
