//! Command failures.
//!
//! Each variant renders to the error line sent to the client; callers and
//! tests can match on the kind instead of the text.

use crate::protocol::RespValue;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No tokens could be decoded from the request.
    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    /// Too few tokens; `required` counts the command name itself.
    #[error("ERR wrong number of arguments for '{command}' command (expects at least {required})")]
    WrongArity {
        command: &'static str,
        required: usize,
    },

    /// EXPIRE or RENAME on a key that does not exist.
    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}
