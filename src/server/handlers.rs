//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /tiles/{z}/{x}/{y}` - Serve a stored tile (`y` may carry an extension)
//! - `GET /info` - Serve the info record
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::store::TileSource;
use crate::tile::{TileCoord, TileInfo};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile source.
pub struct AppState<S: TileSource> {
    /// Where tiles are read from
    pub source: Arc<S>,

    /// Cache-Control max-age in seconds, used when a tile carries no
    /// cache-control header of its own
    pub cache_max_age: u32,
}

impl<S: TileSource> AppState<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_cache_max_age(source, 3600)
    }

    pub fn with_cache_max_age(source: Arc<S>, cache_max_age: u32) -> Self {
        Self {
            source,
            cache_max_age,
        }
    }
}

impl<S: TileSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{z}/{x}/{filename}` where filename is `{y}` or
/// `{y}.{ext}`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Zoom level
    pub z: u8,

    /// Column
    pub x: u32,

    /// Row with optional extension (e.g., "3" or "3.png")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the row, ignoring any extension.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        let y = self
            .filename
            .split_once('.')
            .map(|(y, _)| y)
            .unwrap_or(&self.filename);
        y.parse()
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "integrity_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(error_type, status = status.as_u16(), "Server error: {}", message);
    } else if status == StatusCode::NOT_FOUND {
        debug!(error_type, status = status.as_u16(), "Resource not found: {}", message);
    } else {
        warn!(error_type, status = status.as_u16(), "Client error: {}", message);
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Map store errors to HTTP responses.
///
/// Absent tiles, info records and archives are 404; a body that fails its
/// hash check is a 500.
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            StoreError::TileNotFound { .. }
            | StoreError::InfoNotFound
            | StoreError::ContentNotFound { .. }
            | StoreError::ArchiveMissing { .. } => (StatusCode::NOT_FOUND, "not_found"),

            StoreError::InvalidCoordinate { .. } | StoreError::InvalidContentHash(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }

            StoreError::Integrity { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "integrity_error"),

            StoreError::Closed | StoreError::ConcurrentOpenConflict { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }

            StoreError::Write(_)
            | StoreError::Open { .. }
            | StoreError::Engine(_)
            | StoreError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

/// Errors a handler can return.
#[derive(Debug)]
pub enum HandlerError {
    Store(StoreError),
    BadRequest(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Store(err) => err.into_response(),
            HandlerError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
            }
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        HandlerError::Store(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{z}/{x}/{y}`
///
/// # Response
///
/// - `200 OK`: the stored body, with the stored headers replayed and
///   `ETag` set to the content hash
/// - `400 Bad Request`: malformed or off-grid coordinate
/// - `404 Not Found`: no tile, or no archive
/// - `500 Internal Server Error`: stored body fails its hash check
pub async fn tile_handler<S: TileSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError> {
    let y = params
        .y()
        .map_err(|_| HandlerError::BadRequest(format!("Invalid tile row: {}", params.filename)))?;

    let tile = state.source.tile(TileCoord::new(params.z, params.x, y)).await?;

    let mut response = Response::new(Body::from(tile.data));
    let headers = response.headers_mut();
    for (name, value) in tile.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(header = name, "skipping stored header that is not valid HTTP"),
        }
    }

    if let Some(hash) = tile.headers.content_md5() {
        if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", hash)) {
            headers.insert(header::ETAG, etag);
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    if !headers.contains_key(header::CACHE_CONTROL) {
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", state.cache_max_age)) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }

    Ok(response)
}

/// Handle info requests.
///
/// `GET /info` returns the stored info record as JSON, or 404.
pub async fn info_handler<S: TileSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<TileInfo>, HandlerError> {
    Ok(Json(state.source.info().await?))
}

/// Handle health check requests.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
