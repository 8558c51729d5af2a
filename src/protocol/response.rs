//! Response payload grammar: a `u32` status followed by opaque data.

use super::{frame, read_u32, ProtocolError, HEADER_SIZE};
use crate::runtime::ByteBuffer;
use bytes::Bytes;

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    /// Malformed or unsupported command.
    Err = 1,
    /// Lookup miss.
    NotFound = 2,
}

impl Status {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Err),
            2 => Some(Status::NotFound),
            _ => None,
        }
    }
}

/// A command result as sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub data: Bytes,
}

impl Response {
    pub fn ok(data: Bytes) -> Self {
        Self {
            status: Status::Ok,
            data,
        }
    }

    pub fn ok_empty() -> Self {
        Self::ok(Bytes::new())
    }

    pub fn err() -> Self {
        Self {
            status: Status::Err,
            data: Bytes::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            data: Bytes::new(),
        }
    }

    /// Payload size on the wire (status + data).
    pub fn payload_len(&self) -> usize {
        4 + self.data.len()
    }

    /// Append the complete response frame to `out`.
    pub fn encode_into(&self, out: &mut ByteBuffer) {
        out.append(&frame::header(self.payload_len()));
        out.append(&(self.status as u32).to_le_bytes());
        out.append(&self.data);
    }

    /// Encode the complete response frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteBuffer::with_capacity(HEADER_SIZE + self.payload_len());
        self.encode_into(&mut out);
        out.as_slice().to_vec()
    }

    /// Parse a response payload (the bytes after the frame header).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let code = read_u32(payload, 0)
            .ok_or(ProtocolError::MalformedResponse("missing status"))?;
        let status =
            Status::from_u32(code).ok_or(ProtocolError::MalformedResponse("unknown status"))?;
        Ok(Self {
            status,
            data: Bytes::copy_from_slice(&payload[4..]),
        })
    }

    /// Decode one complete response frame from the head of `buf`.
    ///
    /// Returns the response and the number of bytes it occupied.
    pub fn decode(buf: &[u8], max_message: usize) -> Result<Option<(Self, usize)>, ProtocolError> {
        match frame::try_decode(buf, max_message)? {
            Some(frame) => Ok(Some((Self::parse(frame.payload)?, frame.consumed))),
            None => Ok(None),
        }
    }
}
