//! Connection state machine for managing TCP connections.
//!
//! A connection expresses its state through three intent flags:
//!
//! - `want_read`: waiting for request bytes (Reading)
//! - `want_write`: responses are queued in `outgoing` (Writing)
//! - `want_close`: terminal, the event loop drops the connection
//!
//! Reading and Writing alternate: once a read produces responses the
//! connection stops reading until its output has drained, which pushes back
//! on clients that do not read their responses.

use crate::protocol::Limits;
use crate::runtime::request::{process_request, ProcessResult};
use crate::runtime::ByteBuffer;
use crate::storage::Store;
use mio::Interest;
use slab::Slab;
use std::io::{self, Read, Write};
use tracing::{debug, error, warn};

/// Read and write attempts a connection gets per turn of the event loop.
pub const DRIVE_BUDGET: usize = 32;

/// Effective state derived from the intent flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Writing,
    Closing,
}

/// Outcome of a single read or write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The attempt did something (or closed the connection); try again.
    Continue,
    /// The socket would block; wait for the next readiness notification.
    Blocked,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    id: usize,
    stream: S,
    want_read: bool,
    want_write: bool,
    want_close: bool,
    /// Bytes read but not yet part of a processed request.
    incoming: ByteBuffer,
    /// Encoded responses not yet accepted by the socket.
    outgoing: ByteBuffer,
    /// Landing area for socket reads, allocated once per connection.
    read_buf: Box<[u8]>,
    /// Interest currently registered with the poller.
    registered: Option<Interest>,
}

impl<S: Read + Write> Connection<S> {
    /// Create a new connection in the initial reading state.
    ///
    /// A single read returns at most `read_chunk` bytes.
    pub fn new(id: usize, stream: S, read_chunk: usize) -> Self {
        Self {
            id,
            stream,
            want_read: true,
            want_write: false,
            want_close: false,
            incoming: ByteBuffer::new(),
            outgoing: ByteBuffer::new(),
            read_buf: vec![0u8; read_chunk].into_boxed_slice(),
            registered: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ConnState {
        if self.want_close {
            ConnState::Closing
        } else if self.want_write {
            ConnState::Writing
        } else {
            ConnState::Reading
        }
    }

    pub fn want_read(&self) -> bool {
        self.want_read
    }

    pub fn want_write(&self) -> bool {
        self.want_write
    }

    pub fn want_close(&self) -> bool {
        self.want_close
    }

    pub fn incoming(&self) -> &ByteBuffer {
        &self.incoming
    }

    pub fn outgoing(&self) -> &ByteBuffer {
        &self.outgoing
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Readiness interest matching the intent flags, `None` once closing.
    pub fn interest(&self) -> Option<Interest> {
        if self.want_close {
            return None;
        }
        match (self.want_read, self.want_write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    pub(crate) fn registered(&self) -> Option<Interest> {
        self.registered
    }

    pub(crate) fn set_registered(&mut self, interest: Option<Interest>) {
        self.registered = interest;
    }

    /// Mark the connection for closing. Unsent output is discarded.
    pub fn close(&mut self) {
        self.want_close = true;
        self.want_read = false;
        self.want_write = false;
        self.incoming.clear();
        self.outgoing.clear();
    }

    /// Make progress without blocking, for at most `DRIVE_BUDGET` attempts.
    ///
    /// Alternates between reading and writing until the socket reports that
    /// it would block or the connection closes. Responses produced by a read
    /// are written right away instead of waiting for writability, and once
    /// output drains any request bytes already sitting in the socket are
    /// picked up.
    ///
    /// Returns `Blocked` when only a new readiness notification can make
    /// further progress (including once the connection is closing), and
    /// `Continue` when the budget ran out first. Readiness is edge-triggered,
    /// so a `Continue` connection must be driven again without waiting for
    /// an event.
    pub fn drive(&mut self, store: &mut Store, limits: &Limits) -> Progress {
        for _ in 0..DRIVE_BUDGET {
            let progress = if self.want_close {
                return Progress::Blocked;
            } else if self.want_write {
                self.handle_write()
            } else if self.want_read {
                self.handle_read(store, limits)
            } else {
                return Progress::Blocked;
            };

            if progress == Progress::Blocked {
                return Progress::Blocked;
            }
        }

        if self.want_close {
            Progress::Blocked
        } else {
            Progress::Continue
        }
    }

    /// Perform one read and process every complete request it yields.
    pub fn handle_read(&mut self, store: &mut Store, limits: &Limits) -> Progress {
        match self.incoming.read_from(&mut self.stream, &mut self.read_buf) {
            Ok(0) => {
                if self.incoming.is_empty() {
                    debug!(conn_id = self.id, "Peer closed connection");
                } else {
                    warn!(
                        conn_id = self.id,
                        pending = self.incoming.len(),
                        "Peer closed connection mid-message"
                    );
                }
                self.close();
                Progress::Continue
            }
            Ok(_) => {
                self.process_incoming(store, limits);
                Progress::Continue
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Progress::Blocked,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Progress::Continue,
            Err(e) => {
                debug!(conn_id = self.id, error = %e, "Read error");
                self.close();
                Progress::Continue
            }
        }
    }

    /// Write as much queued output as the socket accepts in one call.
    pub fn handle_write(&mut self) -> Progress {
        if self.outgoing.is_empty() {
            self.start_reading();
            return Progress::Continue;
        }

        match self.stream.write(self.outgoing.as_slice()) {
            Ok(0) => {
                debug!(conn_id = self.id, "Write returned 0");
                self.close();
                Progress::Continue
            }
            Ok(n) => {
                if let Err(e) = self.outgoing.consume(n) {
                    error!(conn_id = self.id, error = %e, "Write accounting failed");
                    self.close();
                    return Progress::Continue;
                }
                if self.outgoing.is_empty() {
                    self.start_reading();
                }
                Progress::Continue
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Progress::Blocked,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Progress::Continue,
            Err(e) => {
                debug!(conn_id = self.id, error = %e, "Write error");
                self.close();
                Progress::Continue
            }
        }
    }

    /// Run every complete request in `incoming`, in arrival order.
    fn process_incoming(&mut self, store: &mut Store, limits: &Limits) {
        loop {
            match process_request(self.incoming.as_slice(), &mut self.outgoing, store, limits) {
                ProcessResult::NeedData => break,
                ProcessResult::Response { consumed } => {
                    if let Err(e) = self.incoming.consume(consumed) {
                        error!(conn_id = self.id, error = %e, "Input accounting failed");
                        self.close();
                        return;
                    }
                }
                ProcessResult::Error(e) => {
                    warn!(conn_id = self.id, error = %e, "Protocol error, closing connection");
                    self.close();
                    return;
                }
            }
        }

        if !self.outgoing.is_empty() {
            self.want_read = false;
            self.want_write = true;
        }
    }

    fn start_reading(&mut self) {
        self.want_read = true;
        self.want_write = false;
    }
}

/// Table of live connections keyed by slab slot.
///
/// The slot id doubles as the poll token, so a readiness event resolves to
/// its connection in O(1).
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S: Read + Write> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a connection built from its assigned id.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert_with<F>(&mut self, build: F) -> Option<usize>
    where
        F: FnOnce(usize) -> Connection<S>,
    {
        if self.is_full() {
            return None;
        }
        let entry = self.connections.vacant_entry();
        let id = entry.key();
        entry.insert(build(id));
        Some(id)
    }

    pub fn get(&self, id: usize) -> Option<&Connection<S>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection, handing ownership back to the caller.
    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }
}
