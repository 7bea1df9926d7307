//! Command parsing.
//!
//! Turns decoded tokens into a [`Command`], checking the verb and the
//! argument count before anything reaches the store. Only the verb is
//! case-insensitive; keys and values are kept byte-for-byte.

use crate::commands::CommandError;
use bytes::Bytes;

/// A validated command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Echo(Bytes),
    FlushAll,
    Set { key: Bytes, value: Bytes },
    Get { key: Bytes },
    /// `None` lists every key.
    Keys { pattern: Option<Bytes> },
    Type { key: Bytes },
    /// DEL and UNLINK.
    Del { key: Bytes },
    Expire { key: Bytes, seconds: u64 },
    Rename { from: Bytes, to: Bytes },
}

impl Command {
    /// Builds a command from its tokens, the first being the verb.
    ///
    /// Extra tokens beyond what a command uses are ignored.
    pub fn parse(tokens: Vec<Bytes>) -> Result<Self, CommandError> {
        let argc = tokens.len();
        let mut tokens = tokens.into_iter();
        let verb = tokens.next().ok_or(CommandError::EmptyCommand)?;
        let verb = String::from_utf8_lossy(&verb).to_ascii_uppercase();

        let (name, min_args): (&'static str, usize) = match verb.as_str() {
            "PING" => ("PING", 1),
            "ECHO" => ("ECHO", 2),
            "FLUSHALL" => ("FLUSHALL", 1),
            "SET" => ("SET", 3),
            "GET" => ("GET", 2),
            "KEYS" => ("KEYS", 1),
            "TYPE" => ("TYPE", 2),
            "DEL" => ("DEL", 2),
            "UNLINK" => ("UNLINK", 2),
            "EXPIRE" => ("EXPIRE", 3),
            "RENAME" => ("RENAME", 3),
            _ => return Err(CommandError::UnknownCommand(verb.replace(['\r', '\n'], " "))),
        };

        if argc < min_args {
            return Err(CommandError::WrongArity {
                command: name,
                required: min_args,
            });
        }

        // Arity is checked, so the `next()` calls below cannot come up short.
        let mut arg = || tokens.next().unwrap_or_default();

        let command = match name {
            "PING" => Command::Ping,
            "ECHO" => Command::Echo(arg()),
            "FLUSHALL" => Command::FlushAll,
            "SET" => Command::Set {
                key: arg(),
                value: arg(),
            },
            "GET" => Command::Get { key: arg() },
            "KEYS" => Command::Keys {
                pattern: (argc > 1).then(&mut arg),
            },
            "TYPE" => Command::Type { key: arg() },
            "DEL" | "UNLINK" => Command::Del { key: arg() },
            "EXPIRE" => {
                let key = arg();
                let seconds = parse_seconds(&arg())?;
                Command::Expire { key, seconds }
            }
            _ => Command::Rename {
                from: arg(),
                to: arg(),
            },
        };

        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Echo(_) => "ECHO",
            Command::FlushAll => "FLUSHALL",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Keys { .. } => "KEYS",
            Command::Type { .. } => "TYPE",
            Command::Del { .. } => "DEL",
            Command::Expire { .. } => "EXPIRE",
            Command::Rename { .. } => "RENAME",
        }
    }
}

fn parse_seconds(token: &[u8]) -> Result<u64, CommandError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(CommandError::NotAnInteger)
}
