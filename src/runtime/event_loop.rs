//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! mio readiness is edge-triggered, so every notification is followed by
//! `Connection::drive`, which keeps reading or writing until the socket
//! reports `WouldBlock`.
//!
//! Each connection gets a bounded number of read/write attempts per turn.
//! One that still has work when its budget runs out is kept on a backlog
//! and driven again next turn, with a zero poll timeout so it is not left
//! waiting for an edge that already fired.
//!
//! Connections are only removed after the whole event batch has been
//! handled. A slab slot freed mid-batch could otherwise be reused by an
//! accepted socket and receive a stale event meant for its predecessor.

use crate::config::Config;
use crate::protocol::Limits;
use crate::runtime::{Connection, ConnectionRegistry, Progress};
use crate::storage::Store;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Tuning knobs for the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    /// Connections beyond this are accepted and immediately dropped.
    pub max_connections: usize,
    /// Readiness events fetched per poll.
    pub event_capacity: usize,
    /// Upper bound for a single socket read.
    pub read_chunk: usize,
    /// Protocol limits.
    pub limits: Limits,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            event_capacity: 1024,
            read_chunk: 64 * 1024,
            limits: Limits::default(),
        }
    }
}

impl From<&Config> for LoopOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_connections: config.max_connections,
            event_capacity: config.event_capacity,
            read_chunk: config.read_chunk,
            limits: Limits {
                max_message: config.max_message,
                max_args: config.max_args,
            },
        }
    }
}

/// Single-threaded reactor owning the listener, the connections and the store.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: ConnectionRegistry<TcpStream>,
    store: Store,
    options: LoopOptions,
    /// Connections that saw an event in the current batch.
    touched: Vec<usize>,
    /// Connections that ran out of budget and must be driven next turn.
    backlog: Vec<usize>,
}

impl EventLoop {
    /// Take over an already bound, non-blocking listener.
    pub fn new(mut listener: TcpListener, store: Store, options: LoopOptions) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(options.event_capacity),
            listener,
            connections: ConnectionRegistry::new(options.max_connections),
            store,
            options,
            touched: Vec::with_capacity(options.event_capacity),
            backlog: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections waiting to be driven without a new event.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Run until polling fails. Never returns `Ok`.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            addr = ?self.listener.local_addr().ok(),
            max_connections = self.options.max_connections,
            max_message = self.options.limits.max_message,
            max_args = self.options.limits.max_args,
            "Event loop started"
        );

        loop {
            self.run_once(None)?;
        }
    }

    /// Wait for readiness once and handle every reported event, then drive
    /// the connections left on the backlog by the previous turn.
    ///
    /// The wait does not block while the backlog is non-empty. An
    /// interrupted wait returns `Ok` without doing any work. Any other poll
    /// failure is returned and leaves the loop unusable.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = if self.backlog.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                error!(error = %e, "Poll failed");
                return Err(e);
            }
        }

        let backlog = std::mem::take(&mut self.backlog);

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_connections(
                        &self.listener,
                        &self.poll,
                        &mut self.connections,
                        self.options.read_chunk,
                    );
                }
                Token(conn_id) => {
                    let conn = match self.connections.get_mut(conn_id) {
                        Some(conn) => conn,
                        None => continue,
                    };

                    if event.is_error() {
                        debug!(conn_id, "Socket error reported");
                        conn.close();
                    } else if conn.drive(&mut self.store, &self.options.limits)
                        == Progress::Continue
                        && !self.backlog.contains(&conn_id)
                    {
                        self.backlog.push(conn_id);
                    }
                    self.touched.push(conn_id);
                }
            }
        }

        for conn_id in backlog {
            // Already driven by an event this turn.
            if self.touched.contains(&conn_id) {
                continue;
            }
            let conn = match self.connections.get_mut(conn_id) {
                Some(conn) => conn,
                None => continue,
            };
            if conn.drive(&mut self.store, &self.options.limits) == Progress::Continue {
                self.backlog.push(conn_id);
            }
            self.touched.push(conn_id);
        }

        for conn_id in self.touched.drain(..) {
            update_connection(&self.poll, &mut self.connections, &self.store, conn_id);
        }
        let connections = &self.connections;
        self.backlog.retain(|&conn_id| connections.contains(conn_id));

        Ok(())
    }
}

fn accept_connections(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    read_chunk: usize,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if connections.is_full() {
                    warn!(peer = %peer_addr, "Connection limit reached");
                    continue;
                }

                let conn_id =
                    match connections.insert_with(|id| Connection::new(id, stream, read_chunk)) {
                        Some(id) => id,
                        None => continue,
                    };

                let conn = match connections.get_mut(conn_id) {
                    Some(conn) => conn,
                    None => continue,
                };
                if let Err(e) =
                    poll.registry()
                        .register(conn.stream_mut(), Token(conn_id), Interest::READABLE)
                {
                    warn!(conn_id, error = %e, "Failed to register connection");
                    connections.remove(conn_id);
                    continue;
                }
                conn.set_registered(Some(Interest::READABLE));

                debug!(conn_id, peer = %peer_addr, "Accepted connection");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "Accept error");
                break;
            }
        }
    }
}

/// Close a connection that wants closing, or bring its poll registration in
/// line with its current interest.
fn update_connection(
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    store: &Store,
    conn_id: usize,
) {
    let conn = match connections.get_mut(conn_id) {
        Some(conn) => conn,
        None => return,
    };

    let interest = match conn.interest() {
        Some(interest) => interest,
        None => {
            close_connection(poll, connections, store, conn_id);
            return;
        }
    };

    if conn.registered() == Some(interest) {
        return;
    }

    match poll
        .registry()
        .reregister(conn.stream_mut(), Token(conn_id), interest)
    {
        Ok(()) => conn.set_registered(Some(interest)),
        Err(e) => {
            debug!(conn_id, error = %e, "Failed to update registration");
            close_connection(poll, connections, store, conn_id);
        }
    }
}

fn close_connection(
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    store: &Store,
    conn_id: usize,
) {
    if let Some(mut conn) = connections.remove(conn_id) {
        let _ = poll.registry().deregister(conn.stream_mut());
        let stats = store.stats();
        debug!(
            conn_id,
            open = connections.len(),
            items = stats.item_count,
            memory_used = stats.memory_used,
            "Connection closed"
        );
    }
}
