use std::sync::Arc;

use rust_acceptor::config::Config;
use rust_acceptor::handler::EchoHandler;
use rust_acceptor::logger;
use rust_acceptor::reactor::CpuSet;
use rust_acceptor::server::Listener;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 可选：第一个参数为配置文件路径
    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    logger::init(&cfg.logging).map_err(|e| e as Box<dyn std::error::Error>)?;

    let workers = cfg.worker_count();
    let mut listener = Listener::new(cfg.endpoint());
    listener.init(workers, cfg.options(), cfg.server.backlog)?;
    listener.set_handler(Arc::new(EchoHandler::default()));

    if cfg.server.pin_workers {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        for index in 0..workers {
            listener.pin_worker(index, &CpuSet::single(index % cores))?;
        }
    }

    listener.bind()?;
    if let Some(addr) = listener.local_addr() {
        logger::log_server_start(&addr, workers, &cfg);
    }

    listener.run()?;
    Ok(())
}
