// Load monitor module
// Background thread polling every reactor's CPU usage once per round

use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::signal::ShutdownState;
use crate::logger;
use crate::reactor::{Reactor, ResourceUsage};

/// Nominal cadence between rounds. The sleep is not compensated for round cost.
pub const ROUND_INTERVAL: Duration = Duration::from_secs(1);

/// Latest per-worker load figures, for observability only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSnapshot {
    /// CPU load per worker in percent of one core, indexed like the pool.
    pub loads: Vec<f64>,
    /// Rounds in which every reactor answered.
    pub rounds: u64,
    /// Rounds dropped because a reactor failed to answer.
    pub failed_rounds: u64,
}

/// Shared cell the monitor publishes into and the listener reads from.
#[derive(Debug, Default)]
pub struct LoadBoard {
    inner: RwLock<LoadSnapshot>,
}

impl LoadBoard {
    pub fn snapshot(&self) -> LoadSnapshot {
        self.inner
            .read()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    fn record_round(&self, loads: Option<Vec<f64>>) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.rounds += 1;
            if let Some(loads) = loads {
                snapshot.loads = loads;
            }
        }
    }

    fn record_failure(&self) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.failed_rounds += 1;
        }
    }
}

/// Load in percent for one worker: `delta_us * 100 / interval_us`.
#[allow(clippy::cast_precision_loss)]
pub fn load_percent(previous: &ResourceUsage, current: &ResourceUsage, interval: Duration) -> f64 {
    let interval_us = interval.as_micros();
    if interval_us == 0 {
        return 0.0;
    }
    let delta_us = current.total_micros().saturating_sub(previous.total_micros());
    (delta_us as f64 * 100.0) / interval_us as f64
}

/// Keeps the previous round's snapshot and turns new rounds into loads.
#[derive(Debug, Default)]
pub struct LoadTracker {
    last: Option<(Instant, Vec<ResourceUsage>)>,
}

impl LoadTracker {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Feed one complete round taken at `at`.
    ///
    /// The first round only establishes the baseline and returns `None`.
    pub fn observe(&mut self, usages: Vec<ResourceUsage>, at: Instant) -> Option<Vec<f64>> {
        let loads = self.last.as_ref().map(|(then, previous)| {
            let interval = at.saturating_duration_since(*then);
            previous
                .iter()
                .zip(&usages)
                .map(|(prev, cur)| load_percent(prev, cur, interval))
                .collect()
        });
        self.last = Some((at, usages));
        loads
    }
}

/// Issue one usage request per reactor, then wait for all of them.
///
/// There is no per-round timeout: a reactor that never answers stalls the round.
pub async fn collect_round<R: Reactor>(workers: &[Arc<R>]) -> Result<Vec<ResourceUsage>, usize> {
    let pending: Vec<_> = workers.iter().map(|w| w.get_load()).collect();
    let mut usages = Vec::with_capacity(pending.len());
    let mut failed = 0;
    for load in pending {
        match load.await {
            Ok(usage) => usages.push(usage),
            Err(_) => failed += 1,
        }
    }
    if failed == 0 {
        Ok(usages)
    } else {
        Err(failed)
    }
}

pub struct LoadMonitor<R: Reactor> {
    workers: Vec<Arc<R>>,
    shutdown: Arc<ShutdownState>,
    board: Arc<LoadBoard>,
    interval: Duration,
}

impl<R: Reactor> LoadMonitor<R> {
    pub const fn new(
        workers: Vec<Arc<R>>,
        shutdown: Arc<ShutdownState>,
        board: Arc<LoadBoard>,
        interval: Duration,
    ) -> Self {
        Self {
            workers,
            shutdown,
            board,
            interval,
        }
    }

    /// Run the monitor on its own thread (`load-monitor`).
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("load-monitor".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                logger::log_error(&format!("Load monitor: failed to build runtime: {e}"));
                return;
            }
        };
        runtime.block_on(self.run_rounds());
    }

    async fn run_rounds(&self) {
        let mut tracker = LoadTracker::new();

        while !self.shutdown.is_triggered() {
            match collect_round(&self.workers).await {
                Ok(usages) => {
                    let loads = tracker.observe(usages, Instant::now());
                    if let Some(loads) = &loads {
                        logger::log_load_round(loads);
                    }
                    self.board.record_round(loads);
                }
                Err(failed) => {
                    // Best effort: drop the round, keep the previous baseline
                    self.board.record_failure();
                    logger::log_load_round_failed(failed, self.workers.len());
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = self.shutdown.wait() => {}
            }
        }
        logger::log_monitor_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::server::{Options, Peer};
    use crate::reactor::CpuSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::oneshot;

    /// Reports `step` more microseconds of user time on every request.
    struct SteppingReactor {
        step: u64,
        calls: AtomicU64,
        fail: bool,
    }

    impl Reactor for SteppingReactor {
        fn idle(_id: usize) -> Self {
            Self {
                step: 250_000,
                calls: AtomicU64::new(0),
                fail: false,
            }
        }
        fn start(&self, _h: Arc<dyn Handler>, _o: Options) -> std::io::Result<()> {
            Ok(())
        }
        fn handle_new_peer(&self, _peer: Peer) {}
        fn get_load(&self) -> oneshot::Receiver<ResourceUsage> {
            let (tx, rx) = oneshot::channel();
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.fail {
                let _ = tx.send(ResourceUsage::new(
                    Duration::from_micros(n * self.step),
                    Duration::ZERO,
                ));
            }
            rx
        }
        fn pin(&self, _cpus: &CpuSet) {}
        fn shutdown(&self) {}
    }

    #[test]
    fn test_load_percent_formula() {
        let prev = ResourceUsage::new(Duration::from_micros(100_000), Duration::from_micros(50_000));
        let cur = ResourceUsage::new(Duration::from_micros(400_000), Duration::from_micros(250_000));
        // delta = 500_000us over 1s => 50%
        let load = load_percent(&prev, &cur, Duration::from_secs(1));
        assert!((load - 50.0).abs() < 1e-9);

        let load = load_percent(&prev, &cur, Duration::from_millis(2_000));
        assert!((load - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_percent_zero_interval() {
        let usage = ResourceUsage::default();
        assert!(load_percent(&usage, &usage, Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn test_first_round_is_baseline_only() {
        let mut tracker = LoadTracker::new();
        let start = Instant::now();
        let round1 = vec![ResourceUsage::default(); 2];
        assert!(tracker.observe(round1, start).is_none());

        let round2 = vec![
            ResourceUsage::new(Duration::from_micros(300_000), Duration::ZERO),
            ResourceUsage::new(Duration::from_micros(50_000), Duration::from_micros(50_000)),
        ];
        let loads = tracker.observe(round2, start + Duration::from_secs(1)).unwrap();
        assert_eq!(loads.len(), 2);
        assert!((loads[0] - 30.0).abs() < 1e-9);
        assert!((loads[1] - 10.0).abs() < 1e-9);

        // Third round compares against the second, not the first
        let round3 = vec![
            ResourceUsage::new(Duration::from_micros(400_000), Duration::ZERO),
            ResourceUsage::new(Duration::from_micros(50_000), Duration::from_micros(50_000)),
        ];
        let loads = tracker.observe(round3, start + Duration::from_secs(2)).unwrap();
        assert!((loads[0] - 10.0).abs() < 1e-9);
        assert!(loads[1].abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_collect_round_waits_for_all() {
        let workers: Vec<_> = (0..3).map(|i| Arc::new(SteppingReactor::idle(i))).collect();
        let usages = collect_round(&workers).await.unwrap();
        assert_eq!(usages.len(), 3);
    }

    #[tokio::test]
    async fn test_collect_round_swallows_failure() {
        let mut broken = SteppingReactor::idle(1);
        broken.fail = true;
        let workers = vec![Arc::new(SteppingReactor::idle(0)), Arc::new(broken)];
        assert_eq!(collect_round(&workers).await, Err(1));
    }

    #[test]
    fn test_monitor_thread_publishes_and_stops() {
        let workers: Vec<_> = (0..2).map(|i| Arc::new(SteppingReactor::idle(i))).collect();
        let shutdown = Arc::new(ShutdownState::new());
        let board = Arc::new(LoadBoard::default());
        let monitor = LoadMonitor::new(
            workers.clone(),
            Arc::clone(&shutdown),
            Arc::clone(&board),
            Duration::from_millis(20),
        );
        let handle = monitor.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while board.snapshot().rounds < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        shutdown.trigger();
        handle.join().unwrap();

        let snapshot = board.snapshot();
        assert!(snapshot.rounds >= 3);
        assert_eq!(snapshot.failed_rounds, 0);
        assert_eq!(snapshot.loads.len(), 2);
        assert!(snapshot.loads.iter().all(|load| *load > 0.0));
    }

    #[test]
    fn test_failed_rounds_counted_not_fatal() {
        let mut broken = SteppingReactor::idle(0);
        broken.fail = true;
        let shutdown = Arc::new(ShutdownState::new());
        let board = Arc::new(LoadBoard::default());
        let handle = LoadMonitor::new(
            vec![Arc::new(broken)],
            Arc::clone(&shutdown),
            Arc::clone(&board),
            Duration::from_millis(10),
        )
        .spawn()
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while board.snapshot().failed_rounds < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        shutdown.trigger();
        handle.join().unwrap();

        let snapshot = board.snapshot();
        assert!(snapshot.failed_rounds >= 2);
        assert_eq!(snapshot.rounds, 0);
        assert!(snapshot.loads.is_empty());
    }
}
