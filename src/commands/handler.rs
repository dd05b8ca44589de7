//! Command Handler
//!
//! Interprets a decoded [`Frame`] and runs it against the storage engine.
//!
//! ## Supported Commands
//!
//! - `PING` - always `+PONG`, extra arguments are ignored
//! - `ECHO value` - the value back as a simple string
//! - `GET key` - the value as a bulk string, `$-1` if absent or expired
//! - `SET key value [PX milliseconds]` - store a value, optionally with a TTL
//!
//! Command names and the `PX` keyword are matched case-insensitively.
//!
//! Failures are replied as simple strings rather than `-ERR` lines, so every
//! request gets a `+` line, a bulk string, or `$-1` back.

use crate::protocol::{Frame, ParseError, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a command was refused. The message is the reply text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    MissingArgument(&'static str),

    /// SET with a shape other than `key value` or `key value PX ms`
    #[error("Error processing SET command")]
    MalformedSet,

    #[error("Could not process px duration provided")]
    InvalidExpire,

    #[error("Received unknown command: {0}")]
    UnknownCommand(String),
}

/// Runs commands against a shared [`StorageEngine`].
///
/// Cheap to clone: each connection gets its own handle to the same store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply to send back.
    pub fn execute(&self, frame: Frame) -> RespValue {
        let name = match frame.name() {
            Some(name) => name.to_ascii_uppercase(),
            None => return RespValue::simple_string("Empty command"),
        };

        let result = match name.as_slice() {
            b"PING" => Ok(RespValue::pong()),
            b"ECHO" => self.cmd_echo(&frame),
            b"GET" => self.cmd_get(&frame),
            b"SET" => self.cmd_set(&frame),
            _ => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(&name).into_owned(),
            )),
        };

        result.unwrap_or_else(|e| RespValue::simple_string(e.to_string()))
    }

    /// The reply for a request that could not be decoded.
    pub fn protocol_error(error: &ParseError) -> RespValue {
        RespValue::simple_string(format!("Protocol error: {}", error))
    }

    /// ECHO value
    fn cmd_echo(&self, frame: &Frame) -> Result<RespValue, CommandError> {
        let value = frame.arg(1).ok_or(CommandError::MissingArgument(
            "Echo command must include value",
        ))?;
        Ok(RespValue::simple_string(value.clone()))
    }

    /// GET key
    fn cmd_get(&self, frame: &Frame) -> Result<RespValue, CommandError> {
        let key = frame
            .arg(1)
            .ok_or(CommandError::MissingArgument("Get command must include key"))?;

        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, frame: &Frame) -> Result<RespValue, CommandError> {
        let (key, value) = match (frame.arg(1), frame.arg(2)) {
            (Some(key), Some(value)) => (key.clone(), value.clone()),
            _ => {
                return Err(CommandError::MissingArgument(
                    "Set command must include key and value",
                ))
            }
        };

        // Validate everything before touching the store
        let ttl = match frame.args() {
            [_, _, _] => None,
            [_, _, _, option, millis] if option.eq_ignore_ascii_case(b"PX") => {
                Some(parse_millis(millis)?)
            }
            _ => return Err(CommandError::MalformedSet),
        };

        match ttl {
            Some(ttl) => self.storage.set_with_ttl(key, value, ttl),
            None => self.storage.set(key, value),
        };

        Ok(RespValue::ok())
    }
}

/// Parses a non-negative millisecond count.
fn parse_millis(raw: &Bytes) -> Result<Duration, CommandError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or(CommandError::InvalidExpire)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> (CommandHandler, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        (CommandHandler::new(Arc::clone(&storage)), storage)
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> RespValue {
        handler.execute(Frame::from_strs(args))
    }

    fn text(s: &str) -> RespValue {
        RespValue::simple_string(s.to_string())
    }

    #[test]
    fn test_ping_is_idempotent() {
        let (handler, _) = create_handler();
        assert_eq!(run(&handler, &["PING"]).serialize(), b"+PONG\r\n");
        assert_eq!(run(&handler, &["PING"]).serialize(), b"+PONG\r\n");
        assert_eq!(run(&handler, &["PING", "extra"]), RespValue::pong());
    }

    #[test]
    fn test_echo() {
        let (handler, _) = create_handler();
        assert_eq!(run(&handler, &["ECHO", "hey"]), text("hey"));
        assert_eq!(
            run(&handler, &["ECHO"]).serialize(),
            b"+Echo command must include value\r\n"
        );
    }

    #[test]
    fn test_set_get() {
        let (handler, _) = create_handler();
        assert_eq!(run(&handler, &["SET", "k", "v"]), RespValue::ok());
        assert_eq!(
            run(&handler, &["GET", "k"]).serialize(),
            b"$1\r\nv\r\n"
        );
    }

    #[test]
    fn test_get_missing_key_is_null() {
        let (handler, _) = create_handler();
        assert_eq!(run(&handler, &["GET", "nope"]).serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_get_without_key() {
        let (handler, _) = create_handler();
        assert_eq!(run(&handler, &["GET"]), text("Get command must include key"));
    }

    #[test]
    fn test_overwrite() {
        let (handler, _) = create_handler();
        run(&handler, &["SET", "k", "v1"]);
        run(&handler, &["SET", "k", "v2"]);
        assert_eq!(
            run(&handler, &["GET", "k"]),
            RespValue::bulk_string(Bytes::from("v2"))
        );
    }

    #[test]
    fn test_bare_set_clears_prior_expiration() {
        let (handler, storage) = create_handler();
        run(&handler, &["SET", "k", "v1", "PX", "0"]);
        run(&handler, &["SET", "k", "v2"]);

        assert!(storage.get_expiration(b"k").is_none());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            run(&handler, &["GET", "k"]),
            RespValue::bulk_string(Bytes::from("v2"))
        );
    }

    #[test]
    fn test_set_px_expires() {
        let (handler, storage) = create_handler();
        assert_eq!(run(&handler, &["SET", "k", "v", "PX", "100"]), RespValue::ok());

        let exp = storage.get_expiration(b"k").unwrap();
        assert_eq!(exp.ttl, Duration::from_millis(100));
        let at = |ms| exp.created_at + Duration::from_millis(ms);
        assert_eq!(storage.get_at(b"k", at(50)), Some(Bytes::from("v")));
        assert_eq!(storage.get_at(b"k", at(150)), None);
    }

    #[test]
    fn test_set_px_with_real_clock() {
        let (handler, _) = create_handler();
        run(&handler, &["SET", "k", "v", "PX", "100"]);
        assert_eq!(run(&handler, &["GET", "k"]).serialize(), b"$1\r\nv\r\n");

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(run(&handler, &["GET", "k"]).serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_case_insensitive_dispatch() {
        let (handler, _) = create_handler();
        for name in ["set", "Set", "SET"] {
            assert_eq!(run(&handler, &[name, "k", name]), RespValue::ok());
            assert_eq!(
                run(&handler, &["get", "k"]),
                RespValue::bulk_string(Bytes::from(name.to_string()))
            );
        }
        assert_eq!(run(&handler, &["pInG"]), RespValue::pong());
        assert_eq!(run(&handler, &["SET", "k", "v", "px", "1000"]), RespValue::ok());
    }

    #[test]
    fn test_set_arity_errors() {
        let (handler, storage) = create_handler();

        assert_eq!(
            run(&handler, &["SET", "k"]),
            text("Set command must include key and value")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "PX"]).serialize(),
            b"+Error processing SET command\r\n"
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "EX", "10"]),
            text("Error processing SET command")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "PX", "10", "NX"]),
            text("Error processing SET command")
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_set_invalid_px_does_not_write() {
        let (handler, storage) = create_handler();

        for bad in ["soon", "-5", ""] {
            assert_eq!(
                run(&handler, &["SET", "k", "v", "PX", bad]),
                text("Could not process px duration provided")
            );
        }
        assert!(storage.is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let (handler, storage) = create_handler();
        assert_eq!(
            run(&handler, &["flushall"]),
            text("Received unknown command: FLUSHALL")
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_protocol_error_reply() {
        let reply = CommandHandler::protocol_error(&ParseError::ExpectedArray(b'G'));
        assert_eq!(reply.serialize(), b"+Protocol error: expected '*', got 0x47\r\n");
    }

    #[test]
    fn test_binary_values_roundtrip() {
        let (handler, _) = create_handler();
        let value = Bytes::from(&b"a\r\n\x00b"[..]);
        let frame = Frame::new(vec![
            Bytes::from("SET"),
            Bytes::from("bin"),
            value.clone(),
        ]);
        assert_eq!(handler.execute(frame), RespValue::ok());
        assert_eq!(
            run(&handler, &["GET", "bin"]),
            RespValue::bulk_string(value)
        );
    }
}
