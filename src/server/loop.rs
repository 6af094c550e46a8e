// Accept loop module
// Waits on the listening socket and on the listen record in the same select

use tokio::net::TcpListener;

use super::connection::{accept_connection, Peer};
use super::signal::ListenRecord;
use crate::error::ListenerError;
use crate::logger;

/// Why the accept loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The listen record was cleared while waiting.
    Released,
    /// `accept` failed after the record had already been cleared.
    ClosedUnderneath,
}

/// Accept connections until the listen record is cleared.
///
/// Every accepted connection becomes a [`Peer`] handed to `dispatch`.
/// An accept failure is fatal unless the record was cleared, which is the
/// only way this loop is meant to stop. Shutdown itself is left to the caller.
pub async fn accept_loop<F>(
    listener: &TcpListener,
    record: &ListenRecord,
    mut dispatch: F,
) -> Result<LoopExit, ListenerError>
where
    F: FnMut(Peer),
{
    loop {
        tokio::select! {
            biased;

            () = record.released() => return Ok(LoopExit::Released),

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => match accept_connection(stream, peer_addr) {
                        Ok(peer) => dispatch(peer),
                        // The connection is gone; the listening socket is fine
                        Err(e) => logger::log_warning(&format!(
                            "Dropping connection from {peer_addr}: {e}"
                        )),
                    },
                    Err(e) => {
                        if record.is_cleared() {
                            return Ok(LoopExit::ClosedUnderneath);
                        }
                        return Err(ListenerError::Os { op: "accept", source: e });
                    }
                }
            }
        }
    }
}
