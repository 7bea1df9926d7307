//! Storage Module
//!
//! - `engine`: the sharded, TTL-aware key/value store
//! - `snapshot`: dump/load to the snapshot file and the periodic dump task
//! - `expiry`: optional background sweeper for keys nobody touches again
//! - `pattern`: glob matching used by `KEYS`
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("dump.my_rdb");
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("ruby"));
//! engine.dump_to(&path).unwrap();
//!
//! engine.clear();
//! engine.load_from(&path).unwrap();
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("ruby")));
//! ```

pub mod engine;
pub mod expiry;
pub mod pattern;
pub mod snapshot;

pub use engine::{StorageEngine, StorageStats, DEFAULT_SHARDS};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use snapshot::{
    SnapshotConfig, SnapshotScheduler, DEFAULT_SNAPSHOT_FILE, DEFAULT_SNAPSHOT_INTERVAL,
    MIN_SNAPSHOT_INTERVAL,
};
