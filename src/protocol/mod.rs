//! Wire Protocol
//!
//! Request decoding and reply encoding for the RESP dialect the server speaks.
//!
//! - `parser`: raw request bytes to a list of command tokens
//! - `types`: the `RespValue` reply model and its encoding
//!
//! ## Example
//!
//! ```
//! use snapkv::protocol::{parse_command, RespValue};
//!
//! let tokens = parse_command(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(tokens.len(), 2);
//!
//! let reply = RespValue::bulk_string("ruby").encode();
//! assert_eq!(&reply[..], b"$4\r\nruby\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_command, tokenize, ParseError, ParseResult};
pub use types::{is_line_safe, RespValue};
