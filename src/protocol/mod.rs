//! Wire Protocol
//!
//! Requests arrive as an array of bulk strings and are decoded into a
//! [`Frame`]. Replies are built as [`RespValue`]s and serialized back onto
//! the socket.
//!
//! ## Modules
//!
//! - `types`: `Frame` and `RespValue` with serialization
//! - `parser`: the frame decoder
//!
//! ## Example
//!
//! ```
//! use kvlite::protocol::{decode_frame, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (frame, consumed) = decode_frame(data).unwrap();
//! assert_eq!(frame.len(), 2);
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode_frame, FrameDecoder, ParseError, ParseResult};
pub use types::{Frame, RespValue};
