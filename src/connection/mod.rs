//! Connection Module
//!
//! One task per client, all sharing a single [`CommandHandler`] and through
//! it a single [`StorageEngine`]. Nothing else is shared between connections.
//!
//! ```text
//!            TcpListener (server::run)
//!                    │ accept()
//!                    ▼
//!          tokio::spawn(handle_connection)
//!                    │
//!   ┌────────────────┴─────────────────┐
//!   │ read ──> process ──> write reply │  (until EOF or I/O error)
//!   └──────────────────────────────────┘
//! ```
//!
//! An I/O failure or disconnect ends only that client's task.
//!
//! [`CommandHandler`]: crate::commands::CommandHandler
//! [`StorageEngine`]: crate::storage::StorageEngine

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
