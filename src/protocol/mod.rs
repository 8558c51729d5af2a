//! Wire protocol.
//!
//! Every message on the wire is a frame: a little-endian `u32` payload
//! length followed by the payload.
//!
//! ```text
//! Request:  | total_len u32 | argc u32 | arg_len u32 | arg bytes | ... |
//! Response: | total_len u32 | status u32 | data ...               |
//! ```
//!
//! - `frame`: the length-prefixed envelope shared by both directions
//! - `request`: argument-array payloads sent by clients
//! - `response`: status + data payloads sent by the server

pub mod frame;
pub mod request;
pub mod response;

pub use frame::{Frame, HEADER_SIZE};
pub use response::{Response, Status};

use thiserror::Error;

/// Default maximum payload size of a single frame.
pub const DEFAULT_MAX_MESSAGE: usize = 4096;

/// Default maximum number of arguments in one request.
pub const DEFAULT_MAX_ARGS: usize = 1024;

/// Protocol limits enforced before any allocation driven by a length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted frame payload, in bytes.
    pub max_message: usize,
    /// Largest accepted argument count.
    pub max_args: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message: DEFAULT_MAX_MESSAGE,
            max_args: DEFAULT_MAX_ARGS,
        }
    }
}

/// Errors that make a byte stream unusable.
///
/// On the server side every variant closes the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A frame header declared a payload larger than the limit.
    #[error("frame length {len} exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// A request declared more arguments than the limit.
    #[error("argument count {argc} exceeds maximum of {max}")]
    TooManyArguments { argc: usize, max: usize },
    /// A request payload is internally inconsistent.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),
    /// A response payload is internally inconsistent.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
}

/// Read a little-endian `u32` at `pos`, if four bytes are available there.
pub(crate) fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let end = pos.checked_add(4)?;
    let bytes: [u8; 4] = buf.get(pos..end)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
