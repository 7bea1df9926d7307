//! Commands
//!
//! Receives decoded requests, validates them, runs them against the storage
//! engine and builds replies.
//!
//! | Command          | Min args | Reply                                      |
//! |------------------|----------|--------------------------------------------|
//! | `PING`           | 1        | `+PONG`                                    |
//! | `ECHO msg`       | 2        | `+msg`                                     |
//! | `FLUSHALL`       | 1        | `+OK`                                      |
//! | `SET key value`  | 3        | `+OK`                                      |
//! | `GET key`        | 2        | bulk value or `$-1`                        |
//! | `KEYS [pattern]` | 1        | array of keys                              |
//! | `TYPE key`       | 2        | `+string` or `+none`                       |
//! | `DEL`/`UNLINK`   | 2        | `:1` or `:0`                               |
//! | `EXPIRE key sec` | 3        | `+OK`, error if the key is missing         |
//! | `RENAME old new` | 3        | `+OK`, error if the source is missing      |

pub mod command;
pub mod error;
pub mod handler;

pub use command::Command;
pub use error::CommandError;
pub use handler::CommandHandler;
