//! Logger module
//!
//! Purpose-named logging functions for the accept tier, emitted through `tracing`:
//! - Startup and bind reporting
//! - Reactor lifecycle and pinning
//! - Load monitor rounds
//! - Shutdown and error reporting

pub mod writer;

use std::io;
use std::net::SocketAddr;

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};
use crate::reactor::CpuSet;
use crate::server::{Endpoint, Options, Peer};

/// Timestamp layout shared by every log line
pub const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Initialize the global subscriber with configuration
///
/// Should be called once at application startup. `RUST_LOG` takes precedence
/// over `logging.level`.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    let writer = writer::make_writer(config.file.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_thread_names(true)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .try_init()
}

pub fn log_server_start(addr: &SocketAddr, workers: usize, config: &Config) {
    tracing::info!("======================================");
    tracing::info!(
        "Accept tier started at {}",
        chrono::Local::now().format(TIME_FORMAT)
    );
    tracing::info!("Listening on: {addr} (requested {})", config.endpoint());
    tracing::info!("Reactor threads: {workers}");
    tracing::info!("Socket options: {}", config.options());
    tracing::info!("Log level: {}", config.logging.level);
    if let Some(ref path) = config.logging.file {
        tracing::info!("Log file: {path}");
    }
    tracing::info!("======================================");
}

pub fn log_bound(endpoint: &Endpoint, local: &SocketAddr, options: Options, backlog: i32) {
    tracing::info!("[Bind] {endpoint} -> {local} (backlog {backlog}, options {options})");
}

pub fn log_candidate_skipped(addr: &SocketAddr, err: &io::Error) {
    tracing::debug!("[Bind] Skipping candidate {addr}: {err}");
}

pub fn log_worker_oversubscribed(workers: usize, cores: usize) {
    log_warning(&format!(
        "More reactors ({workers}) than available cores ({cores})"
    ));
}

pub fn log_dispatch(peer: &Peer, worker: usize) {
    tracing::trace!("[Dispatch] fd {} from {} -> reactor {worker}", peer.fd(), peer.addr());
}

pub fn log_reactor_started(id: usize) {
    tracing::debug!("[Reactor {id}] Started");
}

pub fn log_reactor_pinned(id: usize, cpus: &CpuSet) {
    tracing::info!("[Reactor {id}] Pinned to CPU(s) {cpus}");
}

pub fn log_reactor_stopped(id: usize) {
    tracing::debug!("[Reactor {id}] Stopped");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!("[Connection] Accepted from: {peer_addr}");
}

pub fn log_connection_error(peer_addr: &SocketAddr, err: &io::Error) {
    tracing::warn!("[Connection] {peer_addr}: {err}");
}

pub fn log_load_round(loads: &[f64]) {
    let rendered: Vec<String> = loads.iter().map(|load| format!("{load:.1}%")).collect();
    tracing::debug!("[Load] {}", rendered.join(" "));
}

pub fn log_load_round_failed(failed: usize, total: usize) {
    log_warning(&format!(
        "[Load] {failed} of {total} reactor(s) did not report; round dropped"
    ));
}

pub fn log_monitor_stopped() {
    tracing::debug!("[Load] Monitor stopped");
}

pub fn log_interrupt_received() {
    tracing::info!("[Signal] SIGINT received, releasing listening socket");
}

pub fn log_shutdown_requested(closed_underneath: bool) {
    if closed_underneath {
        tracing::info!("[Shutdown] Listening socket closed, leaving accept loop");
    } else {
        tracing::info!("[Shutdown] Interrupt handled, leaving accept loop");
    }
}

pub fn log_workers_stopped(count: usize) {
    tracing::info!("[Shutdown] Stop requested for {count} reactor(s)");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_debug(message: &str) {
    tracing::debug!("{message}");
}
