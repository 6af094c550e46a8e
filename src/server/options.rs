// Socket option set
// Orthogonal tuning flags applied once to every socket the listener opens

use socket2::Socket;
use std::fmt;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use crate::sys;

/// Bitset of socket tuning flags. An absent flag leaves the OS default alone.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Options(u8);

impl Options {
    /// `SO_REUSEADDR`
    pub const REUSE_ADDRESS: Self = Self(1);
    /// `SO_LINGER` with a one second timeout
    pub const LINGER: Self = Self(1 << 1);
    /// `TCP_FASTOPEN`
    pub const FAST_OPEN: Self = Self(1 << 2);
    /// `TCP_NODELAY`
    pub const NO_DELAY: Self = Self(1 << 3);
    /// Install the process-wide interrupt handler at `init`
    pub const INSTALL_SIGNAL_HANDLER: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::REUSE_ADDRESS, "ReuseAddress"),
        (Self::LINGER, "Linger"),
        (Self::FAST_OPEN, "FastOpen"),
        (Self::NO_DELAY, "NoDelay"),
        (Self::INSTALL_SIGNAL_HANDLER, "InstallSignalHandler"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set `flag` when `enabled`, used when building from config booleans.
    #[must_use]
    pub const fn with_if(self, flag: Self, enabled: bool) -> Self {
        if enabled {
            self.with(flag)
        } else {
            self
        }
    }

    /// Apply the socket-level flags to a freshly opened socket.
    pub fn apply(self, socket: &Socket) -> io::Result<()> {
        if self.contains(Self::REUSE_ADDRESS) {
            socket.set_reuse_address(true)?;
        }

        if self.contains(Self::LINGER) {
            socket.set_linger(Some(Duration::from_secs(1)))?;
        }

        if self.contains(Self::FAST_OPEN) {
            sys::set_tcp_fastopen(socket, sys::FAST_OPEN_QUEUE)?;
        }

        if self.contains(Self::NO_DELAY) {
            socket.set_tcp_nodelay(true)?;
        }

        Ok(())
    }
}

impl BitOr for Options {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, Protocol, Type};

    #[test]
    fn test_flags_combine() {
        let opts = Options::REUSE_ADDRESS | Options::NO_DELAY;
        assert!(opts.contains(Options::REUSE_ADDRESS));
        assert!(opts.contains(Options::NO_DELAY));
        assert!(!opts.contains(Options::LINGER));
        assert!(!opts.contains(Options::REUSE_ADDRESS | Options::LINGER));
        assert_eq!(opts.to_string(), "ReuseAddress|NoDelay");
        assert_eq!(Options::empty().to_string(), "none");
    }

    #[test]
    fn test_with_if() {
        let opts = Options::empty()
            .with_if(Options::LINGER, true)
            .with_if(Options::FAST_OPEN, false);
        assert_eq!(opts, Options::LINGER);
    }

    #[test]
    fn test_apply_sets_socket_options() {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        (Options::REUSE_ADDRESS | Options::LINGER | Options::NO_DELAY)
            .apply(&socket)
            .unwrap();
        assert!(socket.reuse_address().unwrap());
        assert_eq!(socket.linger().unwrap(), Some(Duration::from_secs(1)));
        assert!(socket.tcp_nodelay().unwrap());
    }

    #[test]
    fn test_empty_leaves_defaults() {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        Options::empty().apply(&socket).unwrap();
        assert!(!socket.reuse_address().unwrap());
        assert_eq!(socket.linger().unwrap(), None);
    }
}
