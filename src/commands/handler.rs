//! Command Dispatcher
//!
//! `CommandHandler` is the only caller of the storage engine on behalf of
//! clients. For each request it:
//!
//! ```text
//! raw bytes ──> parse_command ──> Command::parse ──> StorageEngine ──> RespValue ──> bytes
//!                 (tokens)         (verb + arity)      (one call)       (reply)
//! ```
//!
//! The handler holds nothing but a shared reference to the engine, so one
//! instance (or cheap clones of it) can serve every connection at once.

use crate::commands::{Command, CommandError};
use crate::protocol::{is_line_safe, parse_command, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Stateless command dispatcher. Cloning it only clones the engine handle.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Decodes one request buffer, runs it, and returns the encoded reply.
    pub fn process(&self, raw: &[u8]) -> Bytes {
        self.respond(raw).encode()
    }

    /// Like [`process`](Self::process), but returns the reply unencoded.
    ///
    /// A request whose framing cannot be decoded gets the empty-command error.
    pub fn respond(&self, raw: &[u8]) -> RespValue {
        let tokens = parse_command(raw).unwrap_or_else(|e| {
            debug!(error = %e, "Malformed request");
            Vec::new()
        });
        self.execute(tokens)
    }

    /// Runs an already tokenized command.
    pub fn execute(&self, tokens: Vec<Bytes>) -> RespValue {
        match Command::parse(tokens).and_then(|command| self.dispatch(command)) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, "Command rejected");
                e.into()
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<RespValue, CommandError> {
        debug!(command = command.name(), "Dispatching");

        let reply = match command {
            Command::Ping => RespValue::pong(),
            Command::Echo(message) => echo_reply(message),
            Command::FlushAll => {
                self.storage.clear();
                RespValue::ok()
            }
            Command::Set { key, value } => {
                self.storage.set(key, value);
                RespValue::ok()
            }
            Command::Get { key } => match self.storage.get(&key) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },
            Command::Keys { pattern } => {
                let keys = match pattern {
                    Some(pattern) => self.storage.keys_matching(&pattern),
                    None => self.storage.keys(),
                };
                RespValue::array(keys.into_iter().map(RespValue::bulk_string).collect())
            }
            Command::Type { key } => RespValue::simple_string(self.storage.key_type(&key)),
            Command::Del { key } => RespValue::integer(self.storage.delete(&key) as i64),
            Command::Expire { key, seconds } => {
                if !self.storage.expire(&key, Duration::from_secs(seconds)) {
                    return Err(CommandError::NoSuchKey);
                }
                RespValue::ok()
            }
            Command::Rename { from, to } => {
                if !self.storage.rename(&from, to) {
                    return Err(CommandError::NoSuchKey);
                }
                RespValue::ok()
            }
        };

        Ok(reply)
    }
}

/// ECHO answers with a status line, falling back to a bulk string for
/// payloads a status line cannot carry (line breaks or non-UTF-8 bytes).
fn echo_reply(message: Bytes) -> RespValue {
    match std::str::from_utf8(&message) {
        Ok(text) if is_line_safe(&message) => RespValue::simple_string(text),
        _ => RespValue::bulk_string(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn make_command(args: &[&str]) -> Vec<u8> {
        let mut buf = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            buf.extend_from_slice(format!("${}\r\n{}\r\n", arg.len(), arg).as_bytes());
        }
        buf
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> Vec<u8> {
        handler.process(&make_command(args)).to_vec()
    }

    #[test]
    fn test_ping_and_echo() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["PING"]), b"+PONG\r\n");
        assert_eq!(run(&handler, &["ping"]), b"+PONG\r\n");
        assert_eq!(run(&handler, &["ECHO", "hello"]), b"+hello\r\n");
        assert!(handler.respond(&make_command(&["ECHO"])).is_error());
    }

    #[test]
    fn test_echo_keeps_reply_framing() {
        let handler = create_handler();

        let request = b"*2\r\n$4\r\nECHO\r\n$7\r\na\r\n:999\r\n";
        assert_eq!(handler.process(request).to_vec(), b"$7\r\na\r\n:999\r\n");

        let request = b"*2\r\n$4\r\nECHO\r\n$2\r\n\xff\xfe\r\n";
        assert_eq!(handler.process(request).to_vec(), b"$2\r\n\xff\xfe\r\n");
    }

    #[test]
    fn test_unknown_verb_with_line_breaks() {
        let handler = create_handler();

        let request = b"*1\r\n$8\r\nX\r\n:1234\r\n";
        assert_eq!(
            handler.process(request).to_vec(),
            b"-ERR unknown command 'X  :1234'\r\n"
        );
    }

    #[test]
    fn test_set_get_del_scenario() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "foo", "bar"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "foo"]), b"$3\r\nbar\r\n");
        assert_eq!(run(&handler, &["GET", "missing"]), b"$-1\r\n");
        assert_eq!(run(&handler, &["DEL", "foo"]), b":1\r\n");
        assert_eq!(run(&handler, &["DEL", "foo"]), b":0\r\n");
    }

    #[test]
    fn test_inline_requests() {
        let handler = create_handler();

        assert_eq!(handler.process(b"SET foo bar\r\n").to_vec(), b"+OK\r\n");
        assert_eq!(handler.process(b"get foo").to_vec(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn test_keys_on_empty_store() {
        let handler = create_handler();
        assert_eq!(run(&handler, &["KEYS"]), b"*0\r\n");
    }

    #[test]
    fn test_keys_lists_live_keys() {
        let handler = create_handler();

        run(&handler, &["SET", "user:1", "a"]);
        run(&handler, &["SET", "user:2", "b"]);
        run(&handler, &["SET", "other", "c"]);

        match handler.respond(&make_command(&["KEYS"])) {
            RespValue::Array(keys) => assert_eq!(keys.len(), 3),
            other => panic!("unexpected reply {:?}", other),
        }
        match handler.respond(&make_command(&["KEYS", "user:*"])) {
            RespValue::Array(mut keys) => {
                keys.sort_by_key(|k| k.to_string());
                assert_eq!(
                    keys,
                    vec![RespValue::bulk_string("user:1"), RespValue::bulk_string("user:2")]
                );
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_flushall_is_idempotent() {
        let handler = create_handler();

        run(&handler, &["SET", "k1", "v1"]);
        run(&handler, &["SET", "k2", "v2"]);

        assert_eq!(run(&handler, &["FLUSHALL"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["KEYS"]), b"*0\r\n");
        assert_eq!(run(&handler, &["FLUSHALL"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["KEYS"]), b"*0\r\n");
    }

    #[test]
    fn test_type() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["TYPE", "k"]), b"+none\r\n");
        run(&handler, &["SET", "k", "v"]);
        assert_eq!(run(&handler, &["TYPE", "k"]), b"+string\r\n");
    }

    #[test]
    fn test_unlink() {
        let handler = create_handler();

        run(&handler, &["SET", "k", "v"]);
        assert_eq!(run(&handler, &["UNLINK", "k"]), b":1\r\n");
        assert_eq!(run(&handler, &["UNLINK", "k"]), b":0\r\n");
    }

    #[test]
    fn test_expire() {
        let handler = create_handler();

        assert_eq!(
            handler.respond(&make_command(&["EXPIRE", "ghost", "10"])),
            CommandError::NoSuchKey.into()
        );

        run(&handler, &["SET", "k", "v"]);
        assert_eq!(run(&handler, &["EXPIRE", "k", "100"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "k"]), b"$1\r\nv\r\n");

        assert_eq!(run(&handler, &["EXPIRE", "k", "0"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "k"]), b"$-1\r\n");
        assert_eq!(run(&handler, &["TYPE", "k"]), b"+none\r\n");
    }

    #[test]
    fn test_expire_rejects_non_numeric_seconds() {
        let handler = create_handler();

        run(&handler, &["SET", "k", "v"]);
        assert_eq!(
            handler.respond(&make_command(&["EXPIRE", "k", "soon"])),
            CommandError::NotAnInteger.into()
        );
        assert_eq!(handler.storage.ttl(b"k"), None);
    }

    #[test]
    fn test_rename() {
        let handler = create_handler();

        assert_eq!(
            handler.respond(&make_command(&["RENAME", "a", "b"])),
            CommandError::NoSuchKey.into()
        );

        run(&handler, &["SET", "a", "1"]);
        assert_eq!(run(&handler, &["RENAME", "a", "b"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "b"]), b"$1\r\n1\r\n");
        assert_eq!(run(&handler, &["GET", "a"]), b"$-1\r\n");
        assert_eq!(run(&handler, &["TYPE", "b"]), b"+string\r\n");
        assert_eq!(run(&handler, &["DEL", "b"]), b":1\r\n");
    }

    #[test]
    fn test_under_arity_set_leaves_store_untouched() {
        let handler = create_handler();

        run(&handler, &["SET", "k", "before"]);
        let reply = handler.respond(&make_command(&["SET", "k"]));
        assert_eq!(
            reply,
            CommandError::WrongArity {
                command: "SET",
                required: 3
            }
            .into()
        );
        assert_eq!(run(&handler, &["GET", "k"]), b"$6\r\nbefore\r\n");
    }

    #[test]
    fn test_malformed_framing() {
        let handler = create_handler();

        assert_eq!(
            handler.process(b"*2\r\n$3\r\nfoo").to_vec(),
            b"-ERR empty command\r\n"
        );
        assert_eq!(handler.process(b"").to_vec(), b"-ERR empty command\r\n");
        assert_eq!(run(&handler, &["PING"]), b"+PONG\r\n");
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["HELLO", "world"]),
            b"-ERR unknown command 'HELLO'\r\n"
        );
    }

    #[test]
    fn test_keys_and_values_are_case_sensitive() {
        let handler = create_handler();

        run(&handler, &["set", "Key", "Value"]);
        assert_eq!(run(&handler, &["GET", "key"]), b"$-1\r\n");
        assert_eq!(run(&handler, &["GET", "Key"]), b"$5\r\nValue\r\n");
    }

    #[test]
    fn test_concurrent_sets_then_keys() {
        use std::thread;

        let handler = create_handler();
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let handler = handler.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("k{}-{}", t, i);
                        let value = format!("v{}-{}", t, i);
                        assert_eq!(run(&handler, &["SET", &key, &value]), b"+OK\r\n");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        match handler.respond(&make_command(&["KEYS"])) {
            RespValue::Array(keys) => assert_eq!(keys.len(), 400),
            other => panic!("unexpected reply {:?}", other),
        }
        for t in 0..8 {
            for i in 0..50 {
                let key = format!("k{}-{}", t, i);
                let expected = format!("v{}-{}", t, i);
                assert_eq!(
                    handler.respond(&make_command(&["GET", &key])),
                    RespValue::bulk_string(expected)
                );
            }
        }
    }
}
