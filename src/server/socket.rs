// Listening socket construction
// Resolves the endpoint and walks the candidates until one binds

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use super::endpoint::Endpoint;
use super::options::Options;
use crate::error::ListenerError;
use crate::logger;

/// Default `listen(2)` backlog.
pub const MAX_BACKLOG: i32 = 128;

/// Resolve `endpoint` into IPv4 candidates, in resolver order.
pub fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, ListenerError> {
    let host = endpoint.resolver_host();
    let addrs = (host.as_str(), endpoint.port())
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(addrs.filter(SocketAddr::is_ipv4).collect())
}

/// Open a listening socket for `endpoint`.
///
/// Candidates that fail to open or bind are skipped; failures applying the
/// options or calling `listen` abort immediately. The returned listener is
/// non-blocking so tokio can drive it.
///
/// # Returns
///
/// * `Ok(TcpListener)` - First candidate that bound and is listening
/// * `Err(NoUsableAddress)` - No candidate could be bound
pub fn open_listener(
    endpoint: &Endpoint,
    options: Options,
    backlog: i32,
) -> Result<TcpListener, ListenerError> {
    let mut last_error = None;

    for addr in resolve(endpoint)? {
        let socket = match Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => socket,
            Err(e) => {
                logger::log_candidate_skipped(&addr, &e);
                last_error = Some(e);
                continue;
            }
        };

        options.apply(&socket).map_err(ListenerError::os("setsockopt"))?;

        if let Err(e) = socket.bind(&addr.into()) {
            // Dropping the socket closes the candidate descriptor
            logger::log_candidate_skipped(&addr, &e);
            last_error = Some(e);
            continue;
        }

        socket.listen(backlog).map_err(ListenerError::os("listen"))?;
        socket.set_nonblocking(true).map_err(ListenerError::os("fcntl"))?;

        return Ok(socket.into());
    }

    Err(ListenerError::NoUsableAddress {
        endpoint: endpoint.to_string(),
        source: last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "resolver returned no IPv4 candidates",
            )
        }),
    })
}
