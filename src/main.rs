//! kvlite server entry point.
//!
//! Sets up logging, binds the TCP listener, and spawns one task per client.

use kvlite::commands::CommandHandler;
use kvlite::config::{help_text, Config, ConfigAction};
use kvlite::connection::{handle_connection, ConnectionStats};
use kvlite::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::parse_from(std::env::args().skip(1)) {
        Ok(ConfigAction::Run(config)) => config,
        Ok(ConfigAction::PrintHelp) => {
            println!("{}", help_text());
            return Ok(());
        }
        Ok(ConfigAction::PrintVersion) => {
            println!("kvlite version {}", kvlite::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", help_text());
            std::process::exit(1);
        }
    };

    // Built from a fixed directive; RUST_LOG is not consulted.
    // Dependencies stay at WARN so --verbose only raises kvlite's own level.
    let directive = if config.verbose {
        "warn,kvlite=debug"
    } else {
        "warn,kvlite=info"
    };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(directive))
        .with_target(false)
        .init();

    let listener = match TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.bind_address(), error = %e, "Failed to bind");
            eprintln!("Failed to bind to port {}", config.port);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", config.bind_address());

    // Shared across all connections
    let storage = Arc::new(StorageEngine::new());
    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
    let stats = Arc::new(ConnectionStats::new());

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    let store = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        keys = store.keys,
        gets = store.get_ops,
        sets = store.set_ops,
        expired = store.expired,
        "Final stats"
    );
    info!("Server shutdown complete");
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
