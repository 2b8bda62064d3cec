//! Flowgate gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                        FLOWGATE                          │
//!   JSON-RPC      │  ┌─────────┐  ┌────────────┐  ┌──────┐  ┌─────────┐      │
//!   ──────────────┼─▶│ origin  │─▶│ rate limit │─▶│ auth │─▶│ session │      │
//!                 │  └─────────┘  └────────────┘  └──────┘  └────┬────┘      │
//!                 │                                              ▼           │
//!                 │  ┌───────────┐   ┌───────────┐   ┌──────────────────┐    │
//!   ◀─────────────┼──│ sanitizer │◀──│capability │◀──│ graph executor   │    │
//!                 │  └───────────┘   │ registry  │   │ (topological)    │    │
//!                 │                  └───────────┘   └──────────────────┘    │
//!                 │   store (credentials, memberships, graphs)   cache       │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use flowgate::cache::{CacheStore, MemoryCache};
use flowgate::config::loader::load_config;
use flowgate::config::validation::validate_config;
use flowgate::config::watcher::ConfigWatcher;
use flowgate::config::GatewayConfig;
use flowgate::lifecycle::{wait_for_signal, Shutdown};
use flowgate::observability::{logging, metrics};
use flowgate::store::MemoryStore;
use flowgate::{ExternalServices, HttpServer};

#[derive(Parser)]
#[command(name = "flowgate", version, about = "Multi-tenant workflow execution gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "flowgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_exists = args.config.exists();
    let config = if config_exists {
        load_config(&args.config)?
    } else {
        let config = GatewayConfig::default();
        validate_config(&config).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })?;
        config
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "flowgate starting");
    if !config_exists {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        allowed_origins = config.origin.allowed_origins.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.store.data_path {
        Some(path) => MemoryStore::load_from_file(Path::new(path))?,
        None => {
            tracing::warn!("No store.data_path configured; starting with an empty store");
            MemoryStore::new()
        }
    };
    let store = Arc::new(store);

    let cache: Option<Arc<dyn CacheStore>> = if config.cache.enabled {
        Some(Arc::new(MemoryCache::new()))
    } else {
        None
    };

    // The watcher must outlive the server for reloads to keep flowing.
    let (_watcher, config_updates) = if config_exists {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        match watcher.run() {
            Ok(handle) => (Some(handle), updates),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start; hot reload disabled");
                (None, updates)
            }
        }
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(
        config,
        ExternalServices {
            credentials: store.clone(),
            graphs: store,
            cache,
        },
    );
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
