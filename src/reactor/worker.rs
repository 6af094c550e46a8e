// Tokio-backed I/O reactor
// One OS thread per reactor, each driving a current-thread runtime with a LocalSet

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use super::{CpuSet, Reactor, ResourceUsage};
use crate::handler::Handler;
use crate::logger;
use crate::server::{Options, Peer};
use crate::sys;

/// Work items delivered to the reactor thread, processed in order.
enum Command {
    Peer(Peer),
    Load(oneshot::Sender<ResourceUsage>),
    Pin(CpuSet),
    Shutdown,
}

/// Reactor running on its own named thread (`io-reactor-N`).
///
/// Commands sent before [`start`](Reactor::start) are queued and handled
/// once the thread is up, so a pin issued right after `init` still applies.
pub struct IoReactor {
    id: usize,
    commands: mpsc::UnboundedSender<Command>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl IoReactor {
    pub const fn id(&self) -> usize {
        self.id
    }

    fn send(&self, command: Command) {
        // A closed channel means the thread already stopped; the command is moot.
        let _ = self.commands.send(command);
    }
}

impl Reactor for IoReactor {
    fn idle(id: usize) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        Self {
            id,
            commands,
            inbox: Mutex::new(Some(inbox)),
            thread: Mutex::new(None),
        }
    }

    fn start(&self, handler: Arc<dyn Handler>, options: Options) -> std::io::Result<()> {
        let inbox = self
            .inbox
            .lock()
            .map_err(|_| std::io::Error::other("reactor state poisoned"))?
            .take()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "reactor already started")
            })?;

        let id = self.id;
        let handle = thread::Builder::new()
            .name(format!("io-reactor-{id}"))
            .spawn(move || run_reactor(id, inbox, handler, options))?;

        if let Ok(mut thread) = self.thread.lock() {
            *thread = Some(handle);
        }
        Ok(())
    }

    fn handle_new_peer(&self, peer: Peer) {
        self.send(Command::Peer(peer));
    }

    fn get_load(&self) -> oneshot::Receiver<ResourceUsage> {
        let (reply, load) = oneshot::channel();
        self.send(Command::Load(reply));
        load
    }

    fn pin(&self, cpus: &CpuSet) {
        self.send(Command::Pin(cpus.clone()));
    }

    fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

impl Drop for IoReactor {
    fn drop(&mut self) {
        self.send(Command::Shutdown);
        let handle = self.thread.get_mut().ok().and_then(Option::take);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                logger::log_error(&format!("I/O reactor {} panicked", self.id));
            }
        }
    }
}

/// Reactor thread body: process commands until shutdown or until every sender is gone.
fn run_reactor(
    id: usize,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    handler: Arc<dyn Handler>,
    options: Options,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            logger::log_error(&format!("I/O reactor {id}: failed to build runtime: {e}"));
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        logger::log_reactor_started(id);
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Peer(peer) => serve_peer(id, peer, &handler, options),
                Command::Load(reply) => match sys::thread_usage() {
                    Ok(usage) => {
                        let _ = reply.send(usage);
                    }
                    // Dropping `reply` reports the failure to the monitor.
                    Err(e) => logger::log_debug(&format!("I/O reactor {id}: getrusage: {e}")),
                },
                Command::Pin(cpus) => match sys::pin_current_thread(&cpus) {
                    Ok(()) => logger::log_reactor_pinned(id, &cpus),
                    Err(e) => logger::log_warning(&format!(
                        "I/O reactor {id}: could not pin to cpus [{cpus}]: {e}"
                    )),
                },
                Command::Shutdown => break,
            }
        }
    });
    // Dropping the LocalSet cancels connections still in flight.
    drop(local);
    logger::log_reactor_stopped(id);
}

/// Register the peer with this thread's runtime and spawn its handler.
fn serve_peer(id: usize, peer: Peer, handler: &Arc<dyn Handler>, options: Options) {
    let (stream, addr) = peer.into_parts();
    let stream = match tokio::net::TcpStream::from_std(stream) {
        Ok(stream) => stream,
        Err(e) => {
            logger::log_error(&format!("I/O reactor {id}: cannot register {addr}: {e}"));
            return;
        }
    };

    if options.contains(Options::NO_DELAY) {
        if let Err(e) = stream.set_nodelay(true) {
            logger::log_debug(&format!("I/O reactor {id}: TCP_NODELAY on {addr}: {e}"));
        }
    }

    let handler = Arc::clone(handler);
    tokio::task::spawn_local(async move {
        handler.on_connection(stream, addr).await;
    });
}
