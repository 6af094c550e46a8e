//! Connection handler module
//!
//! The application logic every reactor invokes once per accepted connection.
//! The accept tier never looks inside it; it only hands one shared instance to
//! each reactor at start time.

pub mod echo;

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;

// Re-export the bundled handler
pub use echo::EchoHandler;

/// Per-connection application callback.
///
/// Futures run on the owning reactor's `LocalSet`, so they need not be `Send`;
/// the handler object itself is shared across reactor threads.
#[async_trait(?Send)]
pub trait Handler: Send + Sync + 'static {
    async fn on_connection(&self, stream: TcpStream, peer: SocketAddr);
}
