//! Command-line configuration for the `tilestash` binary.
//!
//! # Commands
//!
//! - `serve`  - expose an archive over HTTP
//! - `info`   - print an archive's info record and state
//! - `export` - write a pyramid to a `{z}/{x}/{y}` directory tree
//! - `import` - load such a tree into an archive
//!
//! # Environment Variables
//!
//! - `TILESTASH_PATH` - Archive path
//! - `TILESTASH_FORMAT` / `TILESTASH_ID` / `TILESTASH_SCALE` - Namespace selection
//! - `TILESTASH_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILESTASH_PORT` - Server port (default: 3000)
//! - `TILESTASH_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TILESTASH_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::store::StoreOptions;
use crate::tile::{Bounds, StreamOptions, MAX_ZOOM};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilestash - a content-addressed map tile store.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilestash")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles from an archive over HTTP.
    Serve(ServeConfig),
    /// Print an archive's info record.
    Info(InfoConfig),
    /// Export a pyramid to a directory tree.
    Export(ExportConfig),
    /// Import a directory tree into an archive.
    Import(ImportConfig),
}

/// Flags shared by every command: which archive and namespace to use.
#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// Archive file path.
    #[arg(long, env = "TILESTASH_PATH")]
    pub path: PathBuf,

    /// Tile format of the namespace (e.g. png, pbf).
    #[arg(long, default_value = "", env = "TILESTASH_FORMAT")]
    pub format: String,

    /// Style or source identifier of the namespace.
    #[arg(long, default_value = "", env = "TILESTASH_ID")]
    pub id: String,

    /// Pixel scale of the namespace.
    #[arg(long, default_value_t = 1, env = "TILESTASH_SCALE")]
    pub scale: u32,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ArchiveArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Archive path is required. Set --path or TILESTASH_PATH".to_string());
        }
        if self.scale == 0 {
            return Err("scale must be greater than 0".to_string());
        }
        if self.format.contains(';') || self.id.contains(';') {
            return Err("format and id must not contain ';'".to_string());
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_format(self.format.clone())
            .with_id(self.id.clone())
            .with_scale(self.scale)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub archive: ArchiveArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILESTASH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILESTASH_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds, for tiles stored without one.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILESTASH_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILESTASH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.archive.validate()?;
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub archive: ArchiveArgs,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.archive.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    #[command(flatten)]
    pub archive: ArchiveArgs,

    /// Lowest zoom level to export.
    #[arg(long, default_value_t = 0)]
    pub min_zoom: u8,

    /// Highest zoom level to export.
    #[arg(long, default_value_t = MAX_ZOOM)]
    pub max_zoom: u8,

    /// Extent as "west,south,east,north" in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub bounds: Option<String>,

    /// Output directory.
    #[arg(long)]
    pub out: PathBuf,

    /// Extension appended to each tile file (e.g. ".png").
    #[arg(long, default_value = "")]
    pub extension: String,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.archive.validate()?;
        if self.min_zoom > self.max_zoom {
            return Err(format!(
                "min_zoom ({}) must not exceed max_zoom ({})",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_zoom > MAX_ZOOM {
            return Err(format!("max_zoom must be at most {}", MAX_ZOOM));
        }
        if self.out.as_os_str().is_empty() {
            return Err("Output directory is required. Set --out".to_string());
        }
        self.parsed_bounds()?;
        Ok(())
    }

    pub fn parsed_bounds(&self) -> Result<Bounds, String> {
        match &self.bounds {
            Some(value) => Bounds::parse(value),
            None => Ok(Bounds::WORLD),
        }
    }

    pub fn stream_options(&self) -> Result<StreamOptions, String> {
        Ok(StreamOptions::new(
            self.min_zoom,
            self.max_zoom,
            self.parsed_bounds()?,
        ))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportConfig {
    #[command(flatten)]
    pub archive: ArchiveArgs,

    /// Directory tree to import.
    #[arg(long)]
    pub from: PathBuf,
}

impl ImportConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.archive.validate()?;
        if !self.from.is_dir() {
            return Err(format!("{} is not a directory", self.from.display()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
