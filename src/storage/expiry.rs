//! Active Expiry Sweeper
//!
//! The engine only evicts expired keys from shards it happens to lock, so a
//! key nobody touches again stays in memory past its deadline. When enabled,
//! this background task sweeps every shard on a timer.
//!
//! The interval adapts: it halves (down to `min_interval`) while sweeps keep
//! finding expired keys and doubles (up to `max_interval`) while they find none.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval used for the first sweep.
    pub base_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
        }
    }
}

/// Handle to the running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper task.
    ///
    /// # Arguments
    ///
    /// * `engine` - The store to sweep
    /// * `config` - Sweep interval bounds
    ///
    /// The task runs until [`stop`](Self::stop) is called or the handle is
    /// dropped. Must be called from inside a tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Active expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the task to exit after its current sweep.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper stopped");
                    return;
                }
                continue;
            }
        }

        let evicted = engine.purge_expired();

        if evicted > 0 {
            interval = (interval / 2).max(config.min_interval);
            debug!(
                evicted,
                next_interval_ms = interval.as_millis() as u64,
                "Expired keys swept"
            );
        } else {
            interval = (interval * 2).min(config.max_interval);
            trace!(next_interval_ms = interval.as_millis() as u64, "Nothing to sweep");
        }
    }
}
