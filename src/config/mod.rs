// Configuration module entry point
// Loads settings from an optional file, the environment, and built-in defaults

mod types;

pub use types::{Config, LoggingConfig, ServerConfig, SocketConfig};

use crate::server::{Endpoint, Options};

/// Default config file, looked up without extension
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load from `config.toml` in the working directory (if present)
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified file path (extension optional)
    ///
    /// `ACCEPTOR_SERVER__PORT=9000` style variables override the file.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("ACCEPTOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "*")?
            .set_default("server.port", 8080)?
            .set_default("server.backlog", 128)?
            .set_default("server.pin_workers", false)?
            .set_default("socket.reuse_address", true)?
            .set_default("socket.linger", false)?
            .set_default("socket.fast_open", false)?
            .set_default("socket.no_delay", true)?
            .set_default("socket.install_signal_handler", true)?
            .set_default("logging.level", "info")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.server.host.clone(), self.server.port)
    }

    pub fn options(&self) -> Options {
        let socket = &self.socket;
        Options::empty()
            .with_if(Options::REUSE_ADDRESS, socket.reuse_address)
            .with_if(Options::LINGER, socket.linger)
            .with_if(Options::FAST_OPEN, socket.fast_open)
            .with_if(Options::NO_DELAY, socket.no_delay)
            .with_if(Options::INSTALL_SIGNAL_HANDLER, socket.install_signal_handler)
    }

    /// Configured reactor count, or the machine's available parallelism
    pub fn worker_count(&self) -> usize {
        self.server.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(tag: &str, body: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rust_acceptor-cfg-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("acceptor.toml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("/nonexistent/rust_acceptor/config").unwrap();
        assert_eq!(cfg.server.host, "*");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.backlog, 128);
        assert!(cfg.server.workers.is_none());
        assert!(!cfg.server.pin_workers);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.file.is_none());
        assert_eq!(
            cfg.options(),
            Options::REUSE_ADDRESS | Options::NO_DELAY | Options::INSTALL_SIGNAL_HANDLER
        );
        assert!(cfg.worker_count() >= 1);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_config(
            "file",
            r#"
[server]
host = "127.0.0.1"
port = 9100
workers = 3
backlog = 64

[socket]
reuse_address = false
fast_open = true
install_signal_handler = false

[logging]
level = "debug"
file = "logs/acceptor.log"
"#,
        );
        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(cfg.endpoint(), Endpoint::new("127.0.0.1", 9100));
        assert_eq!(cfg.worker_count(), 3);
        assert_eq!(cfg.server.backlog, 64);
        assert_eq!(cfg.options(), Options::FAST_OPEN | Options::NO_DELAY);
        assert_eq!(cfg.logging.file.as_deref(), Some("logs/acceptor.log"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_wildcard_endpoint() {
        let cfg = Config::load_from("/nonexistent/rust_acceptor/config").unwrap();
        let endpoint = cfg.endpoint();
        assert_eq!(endpoint.host(), "*");
        assert_eq!(endpoint.resolver_host(), "0.0.0.0");
    }
}
