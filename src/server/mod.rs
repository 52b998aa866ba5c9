//! Read-only HTTP access to a tile source.
//!
//! ```text
//! GET /tiles/{z}/{x}/{y}  ──► TileSource::tile ──► stored body + stored headers
//! GET /info               ──► TileSource::info ──► info record (JSON)
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, info_handler, tile_handler, AppState, ErrorResponse, HandlerError,
    HealthResponse, TilePathParams,
};
pub use routes::{create_router, RouterConfig};
