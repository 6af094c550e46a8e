// 服务器模块入口
// Accept tier: listening socket, dispatch to reactors, load monitor, SIGINT shutdown

pub mod connection;
pub mod endpoint;
pub mod listener;
pub mod monitor;
pub mod options;
pub mod signal;
pub mod socket;

// Rust 不允许 loop 作为模块名（关键字），改用 server_loop
#[path = "loop.rs"]
pub mod server_loop;

// 重新导出常用类型
pub use connection::{worker_index, Peer};
pub use endpoint::Endpoint;
pub use listener::Listener;
pub use monitor::LoadSnapshot;
pub use options::Options;
pub use signal::ListenRecord;
pub use socket::MAX_BACKLOG;
