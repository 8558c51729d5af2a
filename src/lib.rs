//! framekv: a single-threaded key-value server.
//!
//! One mio event loop multiplexes every client connection. Requests and
//! responses travel in little-endian length-prefixed frames:
//!
//! - `get <key>`: value, or NOT_FOUND
//! - `set <key> <value>`: stores and echoes the value
//! - `del <key>`: removes the key, succeeding whether or not it existed
//!
//! The store lives in memory only and is owned by the event loop thread.

pub mod command;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod server;
pub mod storage;

pub use config::Config;
pub use runtime::{EventLoop, LoopOptions};
pub use storage::Store;
