// Connection handle module
// Wraps each accepted socket into a Peer and decides which reactor owns it

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use super::endpoint::Endpoint;

/// One accepted connection: a non-blocking stream plus the remote address.
///
/// Moved into exactly one reactor; never cloned.
#[derive(Debug)]
pub struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
}

impl Peer {
    pub const fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self { stream, addr }
    }

    /// Kernel-assigned descriptor value, the routing key.
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from_socket_addr(self.addr)
    }

    pub fn into_parts(self) -> (TcpStream, SocketAddr) {
        (self.stream, self.addr)
    }
}

/// Turn a freshly accepted stream into a [`Peer`] ready to cross threads.
///
/// The stream is detached from the accepting runtime and forced non-blocking.
pub fn accept_connection(stream: tokio::net::TcpStream, addr: SocketAddr) -> io::Result<Peer> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(true)?;
    Ok(Peer::new(stream, addr))
}

/// Reactor index for a descriptor: `fd mod workers`.
///
/// Static on purpose; the monitor's load figures are never consulted here.
/// Uniformity depends on how the kernel hands out descriptor numbers.
pub fn worker_index(fd: RawFd, workers: usize) -> usize {
    debug_assert!(workers > 0, "worker pool is never empty after init");
    fd.unsigned_abs() as usize % workers
}
