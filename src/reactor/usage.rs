use std::time::Duration;

/// Cumulative CPU time a reactor thread has consumed since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    /// Time spent in user mode.
    pub user: Duration,
    /// Time spent in kernel mode.
    pub system: Duration,
}

impl ResourceUsage {
    pub const fn new(user: Duration, system: Duration) -> Self {
        Self { user, system }
    }

    /// Build from `(seconds, microseconds)` pairs as reported by `getrusage`.
    ///
    /// Negative components are clamped to zero.
    pub fn from_timevals(user: (i64, i64), system: (i64, i64)) -> Self {
        Self {
            user: timeval_to_duration(user),
            system: timeval_to_duration(system),
        }
    }

    /// User plus system time, in microseconds.
    pub fn total_micros(&self) -> u128 {
        (self.user + self.system).as_micros()
    }
}

fn timeval_to_duration((secs, micros): (i64, i64)) -> Duration {
    let secs = u64::try_from(secs).unwrap_or(0);
    let micros = u64::try_from(micros).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}
