//! Per-connection byte queues.
//!
//! A `ByteBuffer` is a growable, contiguous byte sequence: bytes are appended
//! at the tail and consumed from the head. Each connection owns two of them,
//! one for unparsed input and one for unsent output.

use bytes::{Buf, BytesMut};
use std::io::{self, Read};
use thiserror::Error;

/// Errors returned by buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Tried to consume more bytes than are buffered.
    #[error("cannot consume {requested} bytes, only {available} buffered")]
    Precondition { requested: usize, available: usize },
}

/// Growable FIFO byte queue.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    inner: BytesMut,
}

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Append bytes at the tail, growing as needed.
    pub fn append(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Remove the first `n` bytes.
    ///
    /// Fails without modifying the buffer if fewer than `n` bytes are held.
    pub fn consume(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.inner.len() {
            return Err(BufferError::Precondition {
                requested: n,
                available: self.inner.len(),
            });
        }
        self.inner.advance(n);
        Ok(())
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The first `n` bytes, if that many are buffered.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.inner.get(..n)
    }

    /// All buffered bytes, head first.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Perform a single `read` call and append what it returned.
    ///
    /// `scratch` is a preallocated landing area, so at most `scratch.len()`
    /// bytes are read and nothing is zero-filled per call. The result of the
    /// underlying call is returned as-is: `Ok(0)` still means end of stream
    /// and `WouldBlock` leaves the buffer unchanged.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, scratch: &mut [u8]) -> io::Result<usize> {
        let n = reader.read(scratch)?.min(scratch.len());
        self.append(&scratch[..n]);
        Ok(n)
    }
}
