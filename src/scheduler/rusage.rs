//! Resource usage around a benchmark run.
//!
//! # What is captured
//!
//! - user / system CPU time
//! - peak RSS (high-water mark, never a delta)
//! - voluntary and involuntary context switches
//!
//! Context switches matter here: every `sched_yield` that actually hands the
//! core over counts as voluntary, every preemption of a spinning worker as
//! involuntary. A FIFO worker at top priority should show almost no
//! involuntary switches during its bursts.
//!
//! # Scope
//!
//! [`rusage_self`] covers the whole process. [`rusage_thread`] covers the
//! calling thread only (Linux `RUSAGE_THREAD`); workers sample it at the
//! start and end of their run.
//!
//! `getrusage` is a syscall; call it at run boundaries, never inside a
//! burst.

use std::fmt;
use std::time::Duration;

/// Resource usage snapshot. Zeroed if `getrusage` fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcUsage {
    pub user_time: Duration,
    pub sys_time: Duration,
    /// Peak RSS in bytes since the process started.
    pub max_rss_bytes: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

impl ProcUsage {
    #[inline]
    pub fn total_cpu_time(&self) -> Duration {
        self.user_time.saturating_add(self.sys_time)
    }

    /// Difference from an earlier snapshot. RSS is carried as the ending
    /// high-water mark.
    #[inline]
    pub fn since(&self, earlier: &ProcUsage) -> ProcUsageDelta {
        ProcUsageDelta {
            user_time: self.user_time.saturating_sub(earlier.user_time),
            sys_time: self.sys_time.saturating_sub(earlier.sys_time),
            ending_max_rss_bytes: self.max_rss_bytes,
            voluntary_switches: self
                .voluntary_switches
                .saturating_sub(earlier.voluntary_switches),
            involuntary_switches: self
                .involuntary_switches
                .saturating_sub(earlier.involuntary_switches),
        }
    }
}

/// Usage consumed between two snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcUsageDelta {
    pub user_time: Duration,
    pub sys_time: Duration,
    /// Absolute high-water mark at the later snapshot; not a delta.
    pub ending_max_rss_bytes: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

impl ProcUsageDelta {
    #[inline]
    pub fn total_cpu_time(&self) -> Duration {
        self.user_time.saturating_add(self.sys_time)
    }
}

impl fmt::Display for ProcUsageDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user_ms={} sys_ms={} max_rss_kib={} nvcsw={} nivcsw={}",
            self.user_time.as_millis(),
            self.sys_time.as_millis(),
            self.ending_max_rss_bytes / 1024,
            self.voluntary_switches,
            self.involuntary_switches
        )
    }
}

/// Clamps a `timeval` into a `Duration` (negative parts become zero).
#[inline]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = if tv.tv_sec < 0 { 0 } else { tv.tv_sec as u64 };
    let usec = tv.tv_usec.clamp(0, 999_999) as u64;
    Duration::from_secs(secs) + Duration::from_micros(usec)
}

/// `ru_maxrss` is KiB on Linux/BSD and bytes on macOS.
#[inline]
fn maxrss_to_bytes(ru_maxrss: libc::c_long) -> u64 {
    let rss = if ru_maxrss <= 0 { 0 } else { ru_maxrss as u64 };
    if cfg!(target_os = "macos") {
        rss
    } else {
        rss.saturating_mul(1024)
    }
}

#[inline]
fn non_negative(v: libc::c_long) -> u64 {
    if v < 0 {
        0
    } else {
        v as u64
    }
}

fn rusage_impl(who: libc::c_int) -> ProcUsage {
    // SAFETY: zeroed rusage is valid; getrusage fills it or fails.
    let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(who, &mut ru) };
    if rc != 0 {
        return ProcUsage::default();
    }
    ProcUsage {
        user_time: timeval_to_duration(ru.ru_utime),
        sys_time: timeval_to_duration(ru.ru_stime),
        max_rss_bytes: maxrss_to_bytes(ru.ru_maxrss),
        voluntary_switches: non_negative(ru.ru_nvcsw),
        involuntary_switches: non_negative(ru.ru_nivcsw),
    }
}

/// Usage of the whole process.
#[inline]
pub fn rusage_self() -> ProcUsage {
    rusage_impl(libc::RUSAGE_SELF)
}

/// Usage of the calling thread.
#[cfg(target_os = "linux")]
#[inline]
pub fn rusage_thread() -> ProcUsage {
    rusage_impl(libc::RUSAGE_THREAD)
}

/// Per-thread usage is Linux-only; elsewhere this returns zeros.
#[cfg(not(target_os = "linux"))]
pub fn rusage_thread() -> ProcUsage {
    ProcUsage::default()
}
