// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub socket: SocketConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host name, IPv4 literal, or `*` for every interface
    pub host: String,
    pub port: u16,
    /// Reactor count; available parallelism when unset
    #[serde(default)]
    pub workers: Option<usize>,
    pub backlog: i32,
    /// Pin reactor `i` to CPU `i mod cores`
    pub pin_workers: bool,
}

/// Socket option flags, one per `Options` bit
#[derive(Debug, Deserialize, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct SocketConfig {
    pub reuse_address: bool,
    pub linger: bool,
    pub fast_open: bool,
    pub no_delay: bool,
    pub install_signal_handler: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `rust_acceptor=debug`
    pub level: String,
    /// Log file path (optional, stdout if not set)
    #[serde(default)]
    pub file: Option<String>,
}
