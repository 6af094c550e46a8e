//! Echo handler
//!
//! Writes every byte it reads straight back until the peer closes or the idle timeout fires.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Handler;
use crate::logger;

const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct EchoHandler {
    idle_timeout: Duration,
}

impl EchoHandler {
    pub const fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(Duration::from_secs(75))
    }
}

#[async_trait(?Send)]
impl Handler for EchoHandler {
    async fn on_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        logger::log_connection_accepted(&peer);
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = match tokio::time::timeout(self.idle_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    logger::log_connection_error(&peer, &e);
                    break;
                }
                Err(_) => {
                    logger::log_debug(&format!(
                        "Connection {peer} idle for {}s, closing",
                        self.idle_timeout.as_secs()
                    ));
                    break;
                }
            };
            if let Err(e) = stream.write_all(&buf[..n]).await {
                logger::log_connection_error(&peer, &e);
                break;
            }
        }
    }
}
