//! Monotonic time source for burst measurement.
//!
//! Bursts are measured against `CLOCK_MONOTONIC` read through `clock_gettime`
//! rather than `Instant`, because the read can fail and a failed read must
//! end the worker with `ResourceUnavailable` instead of panicking.

use std::io;
use std::time::Duration;

/// A monotonic clock that may fail to read.
///
/// Implementations must never go backwards between successful reads on the
/// same thread.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> io::Result<Duration>;
}

/// `CLOCK_MONOTONIC` via `clock_gettime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> io::Result<Duration> {
        // SAFETY: zeroed timespec is valid; clock_gettime writes it or fails.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        timespec_to_duration(ts)
    }
}

#[inline]
fn timespec_to_duration(ts: libc::timespec) -> io::Result<Duration> {
    if ts.tv_sec < 0 || !(0..1_000_000_000).contains(&ts.tv_nsec) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("clock returned invalid timespec {}.{}", ts.tv_sec, ts.tv_nsec),
        ));
    }
    Ok(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}
