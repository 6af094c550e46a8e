//! Thin wrappers over the system calls `socket2` and `std` do not cover.
//!
//! Everything here acts on the *calling* thread or on a borrowed descriptor,
//! so callers decide which thread runs them.

#![allow(unsafe_code)]

use std::io;
use std::os::fd::AsRawFd;

use crate::reactor::{CpuSet, ResourceUsage};

/// Queue length hint passed to `TCP_FASTOPEN`.
pub const FAST_OPEN_QUEUE: libc::c_int = 5;

/// CPU time consumed so far by the calling thread.
#[cfg(target_os = "linux")]
pub fn thread_usage() -> io::Result<ResourceUsage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: `usage` is a valid, writable rusage buffer for the duration of the call.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_THREAD, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: getrusage returned 0, so the buffer is initialised (it was zeroed anyway).
    let usage = unsafe { usage.assume_init() };
    Ok(ResourceUsage::from_timevals(
        (i64::from(usage.ru_utime.tv_sec), i64::from(usage.ru_utime.tv_usec)),
        (i64::from(usage.ru_stime.tv_sec), i64::from(usage.ru_stime.tv_usec)),
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn thread_usage() -> io::Result<ResourceUsage> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "per-thread resource usage is only available on Linux",
    ))
}

/// Restrict the calling thread to the CPUs in `set`.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(set: &CpuSet) -> io::Result<()> {
    let limit = usize::try_from(libc::CPU_SETSIZE).unwrap_or(0);
    if set.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty cpu set"));
    }
    if let Some(cpu) = set.iter().find(|&cpu| cpu >= limit) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cpu {cpu} exceeds CPU_SETSIZE ({limit})"),
        ));
    }

    // SAFETY: cpu_set_t is plain data; all-zero is the empty set.
    let mut cpuset: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    for cpu in set.iter() {
        // SAFETY: `cpu` was checked against CPU_SETSIZE above.
        unsafe { libc::CPU_SET(cpu, &mut cpuset) };
    }

    // SAFETY: pid 0 targets the calling thread; the mask pointer and size match.
    let rc = unsafe {
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset)
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_set: &CpuSet) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "cpu affinity is only available on Linux",
    ))
}

/// Enable `TCP_FASTOPEN` on a listening socket.
#[cfg(target_os = "linux")]
pub fn set_tcp_fastopen(socket: &impl AsRawFd, queue: libc::c_int) -> io::Result<()> {
    // SAFETY: the option value points at a live c_int and the length matches it.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_FASTOPEN,
            std::ptr::from_ref(&queue).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_tcp_fastopen(_socket: &impl AsRawFd, _queue: libc::c_int) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "TCP_FASTOPEN is only wired up on Linux",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_thread_usage_is_monotonic() {
        let before = thread_usage().unwrap();
        let mut x = 0u64;
        for i in 0..2_000_000u64 {
            x = x.wrapping_add(i * i);
        }
        std::hint::black_box(x);
        let after = thread_usage().unwrap();
        assert!(after.total_micros() >= before.total_micros());
    }

    #[test]
    fn test_pin_rejects_empty_set() {
        let err = pin_current_thread(&CpuSet::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_fastopen_on_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        // Kernels built without TFO reject the option, nothing else may fail
        if let Err(e) = set_tcp_fastopen(&listener, FAST_OPEN_QUEUE) {
            let code = e.raw_os_error();
            assert!(
                code == Some(libc::ENOPROTOOPT) || code == Some(libc::EOPNOTSUPP),
                "unexpected TCP_FASTOPEN failure: {e}"
            );
        }
    }
}
