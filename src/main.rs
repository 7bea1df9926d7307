//! snapkv server entry point.
//!
//! Loads the snapshot, starts the background tasks, serves clients, and on
//! Ctrl+C writes a final snapshot before exiting.

use anyhow::Context;
use clap::Parser;
use snapkv::commands::CommandHandler;
use snapkv::config::Config;
use snapkv::connection::ConnectionStats;
use snapkv::storage::{snapshot, ExpiryConfig, ExpirySweeper, SnapshotConfig, SnapshotScheduler, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
snapkv v{} - in-memory key/value server
───────────────────────────────────────
Listening on    {}
Snapshot file   {}
Use Ctrl+C to shut down (a final snapshot is written).
"#,
        snapkv::VERSION,
        config.bind_address(),
        config.snapshot_file.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let storage = Arc::new(StorageEngine::with_shards(config.shards));
    info!(shards = storage.shard_count(), "Storage engine initialized");

    match snapshot::load(Arc::clone(&storage), config.snapshot_file.clone()).await {
        Ok(entries) => info!(
            path = %config.snapshot_file.display(),
            entries,
            "Snapshot loaded"
        ),
        Err(e) => warn!(
            path = %config.snapshot_file.display(),
            error = %e,
            "No snapshot loaded, starting empty"
        ),
    }

    let scheduler = config.snapshot_interval().map(|interval| {
        SnapshotScheduler::start(
            Arc::clone(&storage),
            SnapshotConfig {
                path: config.snapshot_file.clone(),
                interval,
            },
        )
    });

    let _sweeper = config
        .active_expiry
        .then(|| ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default()));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    print_banner(&config);
    info!(address = %config.bind_address(), "Ready to accept connections");

    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(Arc::clone(&storage));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = {
        let stats = Arc::clone(&stats);
        async move {
            snapkv::server::run(&listener, handler, stats, shutdown_rx).await;
            listener
        }
    };
    let server = tokio::spawn(server);

    signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown signal received, stopping server...");

    let _ = shutdown_tx.send(true);
    let listener = server.await.context("accept loop panicked")?;

    if let Some(scheduler) = scheduler {
        scheduler.stop();
    }

    match snapshot::save(Arc::clone(&storage), config.snapshot_file.clone()).await {
        Ok(entries) => info!(
            path = %config.snapshot_file.display(),
            entries,
            "Final snapshot written"
        ),
        Err(e) => error!(
            path = %config.snapshot_file.display(),
            error = %e,
            "Final snapshot failed"
        ),
    }

    let store_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        keys = storage.len(),
        expired = store_stats.expired,
        "Server shutdown complete"
    );

    drop(listener);
    Ok(())
}
