//! Command-line configuration for the `snapkv` server.

use crate::storage::{DEFAULT_SHARDS, DEFAULT_SNAPSHOT_FILE};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "snapkv", about = "In-memory key/value server with snapshot persistence", version)]
pub struct Config {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Snapshot file loaded at startup and written periodically and on shutdown
    #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
    pub snapshot_file: PathBuf,

    /// Seconds between periodic snapshots; 0 disables them
    #[arg(long, default_value_t = 300)]
    pub snapshot_interval: u64,

    /// Number of independently locked store partitions (1 = one global lock)
    #[arg(long, default_value_t = DEFAULT_SHARDS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub shards: usize,

    /// Evict expired keys in the background instead of only on access
    #[arg(long)]
    pub active_expiry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            snapshot_file: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            snapshot_interval: 300,
            shards: DEFAULT_SHARDS,
            active_expiry: false,
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `None` when periodic snapshots are disabled.
    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval > 0).then(|| Duration::from_secs(self.snapshot_interval))
    }
}
