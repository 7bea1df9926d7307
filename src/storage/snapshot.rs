//! Snapshot Persistence
//!
//! The snapshot file is plain text with one record per line:
//!
//! ```text
//! [Key-Value] user:1 alpha
//! [Key-Value] counter 42
//! ```
//!
//! Keys and values are separated by whitespace, so a value containing
//! whitespace does not survive a round trip. Deadlines are not written: every
//! key restored from a snapshot is persistent until `EXPIRE` re-arms it.
//! Lines that do not start with the record marker are skipped on load.
//!
//! [`SnapshotScheduler`] runs the periodic background dump.

use crate::storage::StorageEngine;
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Marker that opens every record line, followed by one space.
pub const RECORD_MARKER: &[u8] = b"[Key-Value] ";

/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_FILE: &str = "dump.my_rdb";

/// Default period between background dumps.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(300);

/// Shortest period the scheduler will run at.
pub const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(1);

impl StorageEngine {
    /// Writes every live key/value pair to `path`.
    ///
    /// The pairs are copied out under the shard locks, then written to a
    /// temporary sibling file that is renamed over `path` once complete, so
    /// readers only ever see a finished snapshot. Dumps and loads on the same
    /// engine run one at a time; dumps racing from other engines or processes
    /// each write their own temporary file and the last rename wins.
    ///
    /// # Returns
    ///
    /// The number of records written. On error the previous file at `path`
    /// is left as it was.
    pub fn dump_to(&self, path: impl AsRef<Path>) -> io::Result<usize> {
        let path = path.as_ref();
        let _dumping = self.snapshot_lock.lock();

        let entries: Vec<(Bytes, Bytes)> = self
            .lock_all()
            .iter()
            .flat_map(|shard| shard.data.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect();

        let tmp = tmp_path(path);
        if let Err(e) = write_file(&tmp, &entries).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        debug!(path = %path.display(), entries = entries.len(), "Snapshot written");
        Ok(entries.len())
    }

    /// Replaces the store's contents with the records in `path`.
    ///
    /// If the file cannot be opened or read the store is left untouched.
    /// Otherwise it is cleared and every well-formed record is inserted
    /// without a deadline. Returns the number of records loaded.
    pub fn load_from(&self, path: impl AsRef<Path>) -> io::Result<usize> {
        let path = path.as_ref();
        let _loading = self.snapshot_lock.lock();
        let entries = read_records(BufReader::new(File::open(path)?))?;

        let mut shards = self.lock_all();
        for shard in shards.iter_mut() {
            shard.clear();
        }
        let count = entries.len();
        for (key, value) in entries {
            shards[self.shard_index(&key)].data.insert(key, value);
        }

        debug!(path = %path.display(), entries = count, "Snapshot loaded");
        Ok(count)
    }
}

/// A temporary name next to `path`, unique per dump: `<path>.<pid>.<seq>.tmp`.
fn tmp_path(path: &Path) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));
    PathBuf::from(tmp)
}

fn write_file(path: &Path, entries: &[(Bytes, Bytes)]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (key, value) in entries {
        write_record(&mut writer, key, value)?;
    }
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

fn write_record(w: &mut impl Write, key: &[u8], value: &[u8]) -> io::Result<()> {
    w.write_all(RECORD_MARKER)?;
    w.write_all(key)?;
    w.write_all(b" ")?;
    w.write_all(value)?;
    w.write_all(b"\n")
}

fn read_records(reader: impl BufRead) -> io::Result<Vec<(Bytes, Bytes)>> {
    let mut entries = Vec::new();
    for line in reader.split(b'\n') {
        if let Some(entry) = parse_record(&line?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Parses one line. A record needs the marker and a key; a missing value
/// reads back as empty.
fn parse_record(line: &[u8]) -> Option<(Bytes, Bytes)> {
    let body = line.strip_prefix(RECORD_MARKER)?;
    let mut tokens = body
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty());

    let key = tokens.next()?;
    let value = tokens.next().unwrap_or_default();
    Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)))
}

/// Dumps `engine` to `path` on the blocking thread pool.
pub async fn save(engine: Arc<StorageEngine>, path: PathBuf) -> io::Result<usize> {
    tokio::task::spawn_blocking(move || engine.dump_to(path))
        .await
        .map_err(io::Error::other)?
}

/// Loads `path` into `engine` on the blocking thread pool.
pub async fn load(engine: Arc<StorageEngine>, path: PathBuf) -> io::Result<usize> {
    tokio::task::spawn_blocking(move || engine.load_from(path))
        .await
        .map_err(io::Error::other)?
}

/// Configuration for the periodic snapshot task.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    pub interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

/// Handle to the background snapshot task. Dropping it stops the task.
#[derive(Debug)]
pub struct SnapshotScheduler {
    shutdown_tx: watch::Sender<bool>,
}

impl SnapshotScheduler {
    /// Spawns a task that dumps `engine` every `config.interval`.
    ///
    /// # Arguments
    ///
    /// * `engine` - The store to dump
    /// * `config` - Target file and period. A period below
    ///   [`MIN_SNAPSHOT_INTERVAL`] (including zero) is raised to it.
    ///
    /// The first dump happens one full interval after start. A failed dump is
    /// logged and retried on the next tick. Must be called from inside a
    /// tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, mut config: SnapshotConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        config.interval = config.interval.max(MIN_SNAPSHOT_INTERVAL);

        info!(
            path = %config.path.display(),
            interval_secs = config.interval.as_secs(),
            "Background snapshots scheduled"
        );
        tokio::spawn(scheduler_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Asks the task to stop. A dump already in progress runs to completion;
    /// a dump started afterwards on the same engine waits for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn scheduler_loop(
    engine: Arc<StorageEngine>,
    config: SnapshotConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Snapshot scheduler stopped");
                    return;
                }
                continue;
            }
        }

        match save(Arc::clone(&engine), config.path.clone()).await {
            Ok(entries) => info!(path = %config.path.display(), entries, "Database dumped"),
            Err(e) => error!(path = %config.path.display(), error = %e, "Error dumping database"),
        }
    }
}
