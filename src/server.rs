//! Server bootstrap.
//!
//! Binds the listening socket and hands it, together with a fresh store, to
//! the event loop.

use crate::config::Config;
use crate::runtime::{EventLoop, LoopOptions};
use crate::storage::Store;
use std::io;
use std::net::SocketAddr;
use tracing::info;

/// Pending connections the kernel may queue before `accept`.
const LISTEN_BACKLOG: i32 = 1024;

/// Bind and run the server until polling fails.
pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.listen_addr()?;
    let listener = bind(addr)?;
    info!(addr = %addr, "Server listening");

    let mut event_loop = EventLoop::new(listener, Store::new(), LoopOptions::from(config))?;
    event_loop.run()?;
    Ok(())
}

/// Create a bound, listening, non-blocking TCP socket.
pub fn bind(addr: SocketAddr) -> io::Result<mio::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(mio::net::TcpListener::from_std(socket.into()))
}
