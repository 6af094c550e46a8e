// Signal handling module
//
// SIGINT is the only external shutdown trigger. Delivery goes through tokio's
// signal driver on a dedicated thread, so the "handler body" below runs on an
// ordinary thread; it still touches nothing but the listen record.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tokio::sync::Notify;

use crate::logger;

const UNBOUND: RawFd = -1;

/// The listening descriptor as seen by the interrupt handler.
///
/// Set once at bind time, cleared once on interrupt. Clearing wakes the
/// pending accept, which then closes the socket and starts shutdown.
#[derive(Debug)]
pub struct ListenRecord {
    fd: AtomicI32,
    released: Notify,
}

impl ListenRecord {
    pub const fn new() -> Self {
        Self {
            fd: AtomicI32::new(UNBOUND),
            released: Notify::const_new(),
        }
    }

    /// Record the descriptor of a freshly bound listening socket.
    pub fn publish(&self, fd: RawFd) {
        self.fd.store(fd, Ordering::Release);
    }

    /// Currently recorded descriptor, if any.
    pub fn current(&self) -> Option<RawFd> {
        match self.fd.load(Ordering::Acquire) {
            UNBOUND => None,
            fd => Some(fd),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.current().is_none()
    }

    /// Clear the record and release the accept loop.
    ///
    /// Returns `false` when nothing was recorded (already cleared or never bound).
    pub fn release(&self) -> bool {
        if self.fd.swap(UNBOUND, Ordering::AcqRel) == UNBOUND {
            return false;
        }
        // notify_one keeps a permit when no accept is pending yet
        self.released.notify_one();
        true
    }

    /// Clear the record only if it still holds `fd`, without waking anyone.
    ///
    /// Used when the owner closes its socket by itself, so a later interrupt
    /// cannot "release" a descriptor that no longer exists.
    pub fn clear_if(&self, fd: RawFd) -> bool {
        fd != UNBOUND
            && self
                .fd
                .compare_exchange(fd, UNBOUND, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Resolves once [`release`](Self::release) has cleared a recorded descriptor.
    ///
    /// A wake-up left over from an earlier descriptor is ignored while a new
    /// one is recorded.
    pub async fn released(&self) {
        loop {
            self.released.notified().await;
            if self.is_cleared() {
                return;
            }
        }
    }
}

impl Default for ListenRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide record the SIGINT watcher clears.
static INTERRUPT_RECORD: Mutex<Option<Arc<ListenRecord>>> = Mutex::new(None);

/// Install the SIGINT watcher once per process and return the shared record.
///
/// Later calls return the same record. Fails if the signal cannot be
/// registered with the OS.
#[cfg(unix)]
pub fn install_interrupt_handler() -> std::io::Result<Arc<ListenRecord>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut installed = INTERRUPT_RECORD
        .lock()
        .map_err(|_| std::io::Error::other("signal handler state poisoned"))?;
    if let Some(record) = installed.as_ref() {
        return Ok(Arc::clone(record));
    }

    let record = Arc::new(ListenRecord::new());
    let watched = Arc::clone(&record);
    let (ready_tx, ready_rx) = mpsc::channel();

    thread::Builder::new()
        .name("sigint-watcher".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            runtime.block_on(async move {
                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while sigint.recv().await.is_some() {
                    if watched.release() {
                        logger::log_interrupt_received();
                    }
                }
            });
        })?;

    ready_rx
        .recv()
        .map_err(|_| std::io::Error::other("signal watcher exited before registering"))??;

    *installed = Some(Arc::clone(&record));
    Ok(record)
}

/// Shutdown flag shared by `shutdown()` and the load monitor.
///
/// Flips false→true exactly once.
#[derive(Debug, Default)]
pub struct ShutdownState {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Only the first caller gets `true`.
    pub fn trigger(&self) -> bool {
        let first = self
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Resolves once the flag is set.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_release_clears_once() {
        let record = ListenRecord::new();
        assert!(!record.release());
        record.publish(7);
        assert_eq!(record.current(), Some(7));
        assert!(record.release());
        assert!(record.is_cleared());
        assert!(!record.release());
    }

    #[tokio::test]
    async fn test_release_before_wait_keeps_permit() {
        let record = ListenRecord::new();
        record.publish(3);
        record.release();
        tokio::time::timeout(Duration::from_secs(1), record.released())
            .await
            .expect("permit should be stored");
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let record = Arc::new(ListenRecord::new());
        record.publish(5);
        let waiter = {
            let record = Arc::clone(&record);
            tokio::spawn(async move { record.released().await })
        };
        tokio::task::yield_now().await;
        record.release();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_clear_if_matches_descriptor() {
        let record = ListenRecord::new();
        assert!(!record.clear_if(UNBOUND));
        record.publish(9);
        assert!(!record.clear_if(10));
        assert_eq!(record.current(), Some(9));
        assert!(record.clear_if(9));
        assert!(record.is_cleared());
        // Nothing left for an interrupt to release
        assert!(!record.release());
    }

    #[tokio::test]
    async fn test_stale_wakeup_ignored_after_republish() {
        let record = ListenRecord::new();
        record.publish(3);
        record.release();
        record.publish(4);
        assert!(
            tokio::time::timeout(Duration::from_millis(100), record.released())
                .await
                .is_err(),
            "a new descriptor must not be released by the old wake-up"
        );
        assert_eq!(record.current(), Some(4));
    }

    #[test]
    fn test_shutdown_triggers_once() {
        let state = ShutdownState::new();
        assert!(!state.is_triggered());
        assert!(state.trigger());
        assert!(!state.trigger());
        assert!(state.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_wait_after_trigger() {
        let state = ShutdownState::new();
        state.trigger();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_install_is_shared() {
        let first = install_interrupt_handler().unwrap();
        let second = install_interrupt_handler().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
