//! RESP Protocol Implementation
//!
//! The wire format spoken by the DriftKV server. It is the Redis
//! Serialization Protocol, so `redis-cli` and other Redis clients can talk to
//! it for the commands DriftKV supports.
//!
//! - `types`: the [`RespValue`] enum and its serializer
//! - `parser`: incremental parser for incoming bytes
//!
//! ## Example
//!
//! ```
//! use driftkv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
