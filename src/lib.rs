//! Listening/accept tier of a multi-threaded TCP server.
//!
//! A [`Listener`](server::Listener) owns one listening socket, accepts on the
//! calling thread and hands each connection to one of N reactor threads by
//! descriptor number. A background monitor samples per-reactor CPU load, and
//! SIGINT stops the accept loop and every reactor.

pub mod config;
pub mod error;
pub mod handler;
pub mod logger;
pub mod reactor;
pub mod server;
pub mod sys;

pub use error::ListenerError;
