//! Custom runtime for non-blocking networking.
//!
//! A single thread drives every connection from one mio `Poll`:
//! - `ByteBuffer`: per-connection input and output queues
//! - `Connection`: per-socket read/write state machine
//! - `request`: decode, execute and encode one request
//! - `EventLoop`: accepts connections and dispatches readiness

mod buffer;
mod connection;
mod event_loop;
pub mod request;

pub use buffer::{BufferError, ByteBuffer};
pub use connection::{ConnState, Connection, ConnectionRegistry, Progress, DRIVE_BUDGET};
pub use event_loop::{EventLoop, LoopOptions};
pub use request::{process_request, ProcessResult};
