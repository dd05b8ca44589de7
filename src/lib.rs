//! # kvlite - A Small In-Memory Key-Value Server
//!
//! kvlite speaks a Redis-like request/response protocol over TCP. Every
//! connection shares one in-memory table of string keys and values; keys can
//! be given a time-to-live in milliseconds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              kvlite                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │   Frame     │    │        StorageEngine         │ │
//! │                     │   Decoder   │    │  64 shards, RwLock each      │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! │                                                       ▲                 │
//! │                                        ┌──────────────┴──────────────┐  │
//! │                                        │  ExpirySweeper (tokio task) │  │
//! │                                        └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kvlite::{handle_connection, start_expiry_sweeper, CommandHandler, ConnectionStats, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("0.0.0.0:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Commands
//!
//! - `PING`
//! - `ECHO value`
//! - `GET key`
//! - `SET key value [PX milliseconds]`
//!
//! ## Expiry
//!
//! A key set with `PX` is live while at most `ttl` has elapsed since the SET.
//! Reads check this lazily; the background sweeper only reclaims memory for
//! keys that are never read again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::{Config, ConfigAction, ConfigError};
pub use connection::{handle_connection, ConnectionError, ConnectionStats};
pub use protocol::{decode_frame, Frame, ParseError, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host: all interfaces
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Crate version, printed by `--version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
