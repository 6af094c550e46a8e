// Error types for the accept tier
// Configuration mistakes and OS failures are kept apart so callers can tell them apart

use std::io;

use thiserror::Error;

/// Errors reported by [`Listener`](crate::server::Listener) operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// An operation was called out of order (e.g. `bind` before `init`).
    #[error("invalid operation: {0}")]
    InvalidState(&'static str),

    /// `init` was asked for an empty worker pool.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// A worker index outside `[0, size)`.
    #[error("worker index {index} out of range (pool size {size})")]
    WorkerIndex { index: usize, size: usize },

    /// The interrupt handler could not be registered.
    #[error("could not install signal handler: {0}")]
    SignalHandler(#[source] io::Error),

    /// Host name resolution failed.
    #[error("could not resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Every resolved candidate failed to open or bind.
    #[error("no usable address for {endpoint}: {source}")]
    NoUsableAddress {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Any other failing system call.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    /// Returns `true` for call-sequence and argument errors, `false` for OS failures.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::InvalidWorkerCount
                | Self::WorkerIndex { .. }
                | Self::SignalHandler(_)
        )
    }

    /// Adapter for `map_err` on a failing system call.
    pub fn os(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Os { op, source }
    }
}
