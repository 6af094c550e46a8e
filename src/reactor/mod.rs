// Worker reactor module entry point
// The boundary the listener talks to, plus the tokio-backed implementation

mod worker;
mod usage;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::handler::Handler;
use crate::server::{Options, Peer};

pub use worker::IoReactor;
pub use usage::ResourceUsage;

/// An independently running event loop that owns a share of the accepted connections.
///
/// The listener only ever addresses reactors by their stable pool index and
/// never shares a peer between two of them.
pub trait Reactor: Send + Sync + 'static {
    /// Create an idle reactor; nothing runs until [`start`](Self::start).
    fn idle(id: usize) -> Self
    where
        Self: Sized;

    /// Begin serving with the given handler and socket options.
    fn start(&self, handler: Arc<dyn Handler>, options: Options) -> std::io::Result<()>;

    /// Hand one connection over; the reactor now owns its descriptor.
    fn handle_new_peer(&self, peer: Peer);

    /// Request a resource-usage snapshot.
    ///
    /// A dropped sender means the request failed.
    fn get_load(&self) -> oneshot::Receiver<ResourceUsage>;

    /// Advisory CPU affinity.
    fn pin(&self, cpus: &CpuSet);

    /// Ask the reactor to stop. Must return promptly.
    fn shutdown(&self);
}

/// A set of CPU indices used for pinning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSet {
    cpus: BTreeSet<usize>,
}

impl CpuSet {
    pub const fn new() -> Self {
        Self {
            cpus: BTreeSet::new(),
        }
    }

    pub fn single(cpu: usize) -> Self {
        let mut set = Self::new();
        set.insert(cpu);
        set
    }

    pub fn insert(&mut self, cpu: usize) -> bool {
        self.cpus.insert(cpu)
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// CPUs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }
}

/// Parses kernel-style cpu lists such as `0-3,6`.
impl FromStr for CpuSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: usize = lo.trim().parse().map_err(|e| format!("Invalid cpu '{lo}': {e}"))?;
                    let hi: usize = hi.trim().parse().map_err(|e| format!("Invalid cpu '{hi}': {e}"))?;
                    if lo > hi {
                        return Err(format!("Invalid cpu range '{part}'"));
                    }
                    set.cpus.extend(lo..=hi);
                }
                None => {
                    let cpu = part.parse().map_err(|e| format!("Invalid cpu '{part}': {e}"))?;
                    set.insert(cpu);
                }
            }
        }
        Ok(set)
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cpu in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{cpu}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        let set: CpuSet = "0-3, 6".parse().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 6]);
        assert_eq!(set.to_string(), "0,1,2,3,6");
    }

    #[test]
    fn test_parse_rejects_reversed_range() {
        assert!("4-2".parse::<CpuSet>().is_err());
        assert!("x".parse::<CpuSet>().is_err());
    }

    #[test]
    fn test_single() {
        let set = CpuSet::single(3);
        assert!(set.contains(3));
        assert_eq!(set.len(), 1);
    }
}
