//! tilestash - a content-addressed map tile store.
//!
//! This binary serves, inspects, exports and imports tile archives.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestash::{
    config::{ArchiveArgs, Cli, Command, ExportConfig, ImportConfig, InfoConfig, ServeConfig},
    server::{create_router, RouterConfig},
    store::{HandleRegistry, Store},
    transfer, StoreError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Info(config) => run_info(config).await,
        Command::Export(config) => run_export(config).await,
        Command::Import(config) => run_import(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilestash=debug,tower_http=debug"
    } else {
        "tilestash=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_store(registry: &HandleRegistry, archive: &ArchiveArgs) -> Option<Store> {
    match registry.open(&archive.path, archive.store_options()).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!("Failed to open {}: {}", archive.path.display(), e);
            None
        }
    }
}

async fn close_store(store: &Store) -> ExitCode {
    match store.close().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to close {}: {}", store.path().display(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.archive.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = HandleRegistry::new();
    let Some(store) = open_store(&registry, &config.archive).await else {
        return ExitCode::FAILURE;
    };
    let store = Arc::new(store);

    info!("Configuration:");
    info!("  Archive: {} ({})", store.path().display(), store.state().await);
    info!("  Namespace: {}", store.options().namespace());
    info!("  Cache max-age: {}s", config.cache_max_age);

    let router = create_router(Arc::clone(&store), build_router_config(&config));
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl http://{}/tiles/0/0/0", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    let code = close_store(&store).await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    code
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    if config.archive.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = HandleRegistry::new();
    let store = match registry
        .open(&config.archive.path, config.archive.store_options())
        .await
    {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Archive:   {}", store.path().display());
    println!("State:     {}", store.state().await);
    println!("Namespace: {}", store.options().namespace());

    let code = match store.get_info().await {
        Ok(info) => match serde_json::to_string_pretty(&info) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(StoreError::InfoNotFound) | Err(StoreError::ArchiveMissing { .. }) => {
            println!("(no info record)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };

    if let Err(e) = store.close().await {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    code
}

// =============================================================================
// Export / Import Commands
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.archive.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let options = match config.stream_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = HandleRegistry::new();
    let Some(store) = open_store(&registry, &config.archive).await else {
        return ExitCode::FAILURE;
    };

    let result = transfer::export(&store, options, &config.out, &config.extension).await;
    let code = close_store(&store).await;

    match result {
        Ok(summary) => {
            println!(
                "Exported {} tile(s) to {} ({} failed)",
                summary.tiles,
                config.out.display(),
                summary.failed
            );
            code
        }
        Err(e) => {
            error!("Export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_import(config: ImportConfig) -> ExitCode {
    init_logging(config.archive.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = HandleRegistry::new();
    let Some(store) = open_store(&registry, &config.archive).await else {
        return ExitCode::FAILURE;
    };

    let result = transfer::import(&store, &config.from).await;
    let code = close_store(&store).await;

    match result {
        Ok(summary) => {
            println!(
                "Imported {} tile(s) from {} ({} failed)",
                summary.tiles,
                config.from.display(),
                summary.failed
            );
            code
        }
        Err(e) => {
            error!("Import failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
