// Listener module
// Owns the listening socket, the reactor pool and the load monitor thread

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::connection::{worker_index, Peer};
use super::endpoint::Endpoint;
use super::monitor::{LoadBoard, LoadMonitor, LoadSnapshot, ROUND_INTERVAL};
use super::options::Options;
use super::server_loop::{accept_loop, LoopExit};
use super::signal::{install_interrupt_handler, ListenRecord, ShutdownState};
use super::socket::{open_listener, MAX_BACKLOG};
use crate::error::ListenerError;
use crate::handler::Handler;
use crate::logger;
use crate::reactor::{CpuSet, IoReactor, Reactor};

/// Accept tier coordinator.
///
/// Lifecycle: [`init`](Self::init) → [`set_handler`](Self::set_handler) →
/// [`bind`](Self::bind) → [`run`](Self::run) → [`shutdown`](Self::shutdown).
/// Dropping the listener shuts it down and joins its background threads.
pub struct Listener<R: Reactor = IoReactor> {
    endpoint: Endpoint,
    options: Options,
    backlog: i32,
    workers: Vec<Arc<R>>,
    handler: Option<Arc<dyn Handler>>,
    socket: Option<StdTcpListener>,
    record: Arc<ListenRecord>,
    shutdown: Arc<ShutdownState>,
    board: Arc<LoadBoard>,
    monitor: Option<JoinHandle<()>>,
}

impl Listener {
    /// Listener backed by [`IoReactor`] workers.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_reactors(endpoint)
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

impl<R: Reactor> Listener<R> {
    /// Listener over any [`Reactor`] implementation. Nothing is allocated until `init`.
    pub fn with_reactors(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            options: Options::empty(),
            backlog: MAX_BACKLOG,
            workers: Vec::new(),
            handler: None,
            socket: None,
            record: Arc::new(ListenRecord::new()),
            shutdown: Arc::new(ShutdownState::new()),
            board: Arc::new(LoadBoard::default()),
            monitor: None,
        }
    }

    /// Allocate `workers` idle reactors and record options and backlog.
    ///
    /// With [`Options::INSTALL_SIGNAL_HANDLER`] the process-wide SIGINT watcher
    /// is installed and its record becomes this listener's record.
    pub fn init(&mut self, workers: usize, options: Options, backlog: i32) -> Result<(), ListenerError> {
        if !self.workers.is_empty() {
            return Err(ListenerError::InvalidState("init() was already called"));
        }
        if workers == 0 {
            return Err(ListenerError::InvalidWorkerCount);
        }

        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        if workers > cores {
            logger::log_worker_oversubscribed(workers, cores);
        }

        if options.contains(Options::INSTALL_SIGNAL_HANDLER) {
            self.record = install_interrupt_handler().map_err(ListenerError::SignalHandler)?;
        }

        self.options = options;
        self.backlog = backlog;
        self.workers = (0..workers).map(|id| Arc::new(R::idle(id))).collect();
        Ok(())
    }

    /// Handler given to every reactor when `bind` starts them.
    pub fn set_handler(&mut self, handler: Arc<dyn Handler>) {
        self.handler = Some(handler);
    }

    /// Pin reactor `index` to `cpus`.
    pub fn pin_worker(&self, index: usize, cpus: &CpuSet) -> Result<(), ListenerError> {
        if self.workers.is_empty() {
            return Err(ListenerError::InvalidState(
                "did you call init() before pin_worker()?",
            ));
        }
        let worker = self.workers.get(index).ok_or(ListenerError::WorkerIndex {
            index,
            size: self.workers.len(),
        })?;
        worker.pin(cpus);
        Ok(())
    }

    /// Bind the endpoint given at construction.
    pub fn bind(&mut self) -> Result<(), ListenerError> {
        let endpoint = self.endpoint.clone();
        self.bind_to(endpoint)
    }

    /// Open the listening socket on `endpoint`, start every reactor and the load monitor.
    pub fn bind_to(&mut self, endpoint: Endpoint) -> Result<(), ListenerError> {
        if self.workers.is_empty() {
            return Err(ListenerError::InvalidState("call init() before calling bind()"));
        }
        if self.socket.is_some() {
            return Err(ListenerError::InvalidState("listener is already bound"));
        }
        if self.shutdown.is_triggered() {
            return Err(ListenerError::InvalidState("listener has been shut down"));
        }
        let handler = self
            .handler
            .clone()
            .ok_or(ListenerError::InvalidState("call set_handler() before calling bind()"))?;

        self.endpoint = endpoint;
        let socket = open_listener(&self.endpoint, self.options, self.backlog)?;
        let local_addr = socket.local_addr().map_err(ListenerError::os("getsockname"))?;

        let fd = socket.as_raw_fd();
        self.record.publish(fd);
        self.socket = Some(socket);
        logger::log_bound(&self.endpoint, &local_addr, self.options, self.backlog);

        if let Err(e) = self.start_serving(&handler) {
            // Reactors cannot be restarted, so a half-started pool means shutdown
            self.record.clear_if(fd);
            self.socket = None;
            self.shutdown();
            return Err(e);
        }
        Ok(())
    }

    fn start_serving(&mut self, handler: &Arc<dyn Handler>) -> Result<(), ListenerError> {
        for worker in &self.workers {
            worker
                .start(Arc::clone(handler), self.options)
                .map_err(ListenerError::os("start reactor"))?;
        }

        let monitor = LoadMonitor::new(
            self.workers.clone(),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.board),
            ROUND_INTERVAL,
        );
        self.monitor = Some(monitor.spawn().map_err(ListenerError::os("spawn load monitor"))?);
        Ok(())
    }

    /// Accept connections on the calling thread until the listen record is cleared.
    ///
    /// Returns `Ok(())` after an orderly shutdown; any other accept failure is
    /// returned as an error. The listening socket is closed and the listen
    /// record cleared on return, whichever way the loop ended.
    pub fn run(&mut self) -> Result<(), ListenerError> {
        let socket = self
            .socket
            .take()
            .ok_or(ListenerError::InvalidState("call bind() before calling run()"))?;
        let fd = socket.as_raw_fd();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                self.record.clear_if(fd);
                ListenerError::Os {
                    op: "build accept runtime",
                    source: e,
                }
            })?;

        let exit = runtime.block_on(async {
            let listener = match tokio::net::TcpListener::from_std(socket) {
                Ok(listener) => listener,
                Err(e) => {
                    self.record.clear_if(fd);
                    return Err(ListenerError::Os {
                        op: "register listener",
                        source: e,
                    });
                }
            };
            let exit = accept_loop(&listener, &self.record, |peer| {
                if let Err(e) = self.dispatch_peer(peer) {
                    logger::log_error(&format!("Dispatch failed: {e}"));
                }
            })
            .await;
            // Cleared while the descriptor is still open, so it cannot name a reused fd
            self.record.clear_if(fd);
            exit
            // `listener` drops here, closing the listening descriptor
        })?;

        logger::log_shutdown_requested(exit == LoopExit::ClosedUnderneath);
        self.shutdown();
        Ok(())
    }

    /// Route a peer to reactor `fd mod worker_count`.
    ///
    /// Before `init` there is no pool to route to and the peer is dropped.
    pub fn dispatch_peer(&self, peer: Peer) -> Result<(), ListenerError> {
        if self.workers.is_empty() {
            return Err(ListenerError::InvalidState(
                "call init() before dispatching peers",
            ));
        }
        let index = worker_index(peer.fd(), self.workers.len());
        logger::log_dispatch(&peer, index);
        self.workers[index].handle_new_peer(peer);
        Ok(())
    }

    /// Stop every reactor and the load monitor. Only the first call has an effect.
    pub fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        for worker in &self.workers {
            worker.shutdown();
        }
        logger::log_workers_stopped(self.workers.len());
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub const fn address(&self) -> &Endpoint {
        &self.endpoint
    }

    pub const fn options(&self) -> Options {
        self.options
    }

    pub const fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Reactor pool in stable index order.
    pub fn workers(&self) -> &[Arc<R>] {
        &self.workers
    }

    /// Listening descriptor while bound and not yet released.
    pub fn listen_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// The record whose release stops [`run`](Self::run), as the SIGINT watcher does.
    pub fn interrupt_handle(&self) -> Arc<ListenRecord> {
        Arc::clone(&self.record)
    }

    /// Most recent load figures from the monitor.
    pub fn load_snapshot(&self) -> LoadSnapshot {
        self.board.snapshot()
    }
}

impl<R: Reactor> Drop for Listener<R> {
    fn drop(&mut self) {
        if let Some(socket) = self.socket.take() {
            self.record.clear_if(socket.as_raw_fd());
        }
        self.shutdown();
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                logger::log_error("Load monitor thread panicked");
            }
        }
    }
}
