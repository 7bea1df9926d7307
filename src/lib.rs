//! # snapkv
//!
//! An in-memory key/value server speaking a small subset of RESP, with
//! per-key expiry and snapshot persistence to a plain-text file.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                               snapkv                               │
//! │                                                                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐          │
//! │  │ server::run │──>│ Connection  │──>│  CommandHandler  │          │
//! │  │ (listener)  │   │  (per task) │   │   (dispatcher)   │          │
//! │  └──────▲──────┘   └─────────────┘   └────────┬─────────┘          │
//! │         │ watch                               │                    │
//! │         │ shutdown                            ▼                    │
//! │  ┌──────┴──────┐   ┌───────────────────────────────────────────┐   │
//! │  │   main.rs   │   │               StorageEngine               │   │
//! │  │  (Ctrl+C)   │   │  ┌────────┐ ┌────────┐       ┌────────┐   │   │
//! │  └─────────────┘   │  │Shard 0 │ │Shard 1 │  ...  │Shard N │   │   │
//! │                    │  │values +│ │values +│       │values +│   │   │
//! │                    │  │expiry  │ │expiry  │       │expiry  │   │   │
//! │                    │  └────────┘ └────────┘       └────────┘   │   │
//! │                    └──────────────▲─────────────▲──────────────┘   │
//! │                                   │             │                  │
//! │                   SnapshotScheduler      ExpirySweeper (optional)  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! `PING`, `ECHO`, `SET`, `GET`, `DEL`/`UNLINK`, `EXPIRE`, `RENAME`,
//! `KEYS [pattern]`, `TYPE`, `FLUSHALL`. Command names are case-insensitive.
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapkv::commands::CommandHandler;
//! use snapkv::connection::ConnectionStats;
//! use snapkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let handler = CommandHandler::new(Arc::clone(&storage));
//!     let listener = TcpListener::bind("127.0.0.1:6380").await?;
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     snapkv::server::run(&listener, handler, Arc::new(ConnectionStats::new()), shutdown_rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: request decoding and reply encoding
//! - [`storage`]: sharded store, expiry, snapshots
//! - [`commands`]: command validation and dispatch
//! - [`connection`]: per-client read/reply loop
//! - [`server`]: accept loop with explicit shutdown
//! - [`config`]: command-line options
//!
//! ## Expiry
//!
//! Deadlines are checked lazily: touching a shard evicts whatever in it has
//! expired. A key nobody touches again stays in memory until the optional
//! [`ExpirySweeper`] is enabled.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespValue};
pub use storage::{ExpiryConfig, ExpirySweeper, SnapshotConfig, SnapshotScheduler, StorageEngine};

/// The default port snapkv listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host snapkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
