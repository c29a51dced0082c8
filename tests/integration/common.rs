//! Shared helpers for harness integration tests.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sched_bench::scheduler::affinity::first_allowed_cpu;
use sched_bench::scheduler::{realtime_permitted, Clock, MonotonicClock, VecSink};
use sched_bench::{Harness, HarnessConfig, PinScope, Result, RunReport};

/// Runs the harness on a fresh thread so controller pinning never leaks into
/// the test runner's thread.
pub fn run_isolated(cfg: HarnessConfig) -> (Result<RunReport>, Arc<VecSink>) {
    let sink = Arc::new(VecSink::new());
    let s = Arc::clone(&sink);
    let res = thread::spawn(move || Harness::new(cfg).with_sink(s).run())
        .join()
        .expect("harness thread panicked");
    (res, sink)
}

/// Pins every context to one allowed core, if the platform supports it.
pub fn on_one_core(cfg: HarnessConfig) -> Option<HarnessConfig> {
    let core = first_allowed_cpu()?;
    Some(cfg.pin_to(core, PinScope::All))
}

/// Real-time tests need CAP_SYS_NICE and a pinnable core.
pub fn realtime_ready() -> bool {
    if !realtime_permitted() {
        eprintln!("skipping: SCHED_FIFO not permitted for this process");
        return false;
    }
    if first_allowed_cpu().is_none() {
        eprintln!("skipping: CPU affinity unavailable");
        return false;
    }
    true
}

/// Counts clock reads; the harness takes its first one only after all
/// setup preflights passed and right before spawning workers.
pub struct CountingClock(pub Arc<AtomicU64>);

impl Clock for CountingClock {
    fn now(&self) -> io::Result<Duration> {
        self.0.fetch_add(1, Ordering::SeqCst);
        MonotonicClock.now()
    }
}

#[cfg(target_os = "linux")]
#[repr(C)]
struct CapHeader {
    version: u32,
    pid: libc::c_int,
}

#[cfg(target_os = "linux")]
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

#[cfg(target_os = "linux")]
const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;
#[cfg(target_os = "linux")]
const CAP_SYS_NICE: u32 = 23;

/// Removes CAP_SYS_NICE from the calling thread for good. Threads it spawns
/// afterwards inherit the reduced set. Returns false if `capset` failed.
#[cfg(target_os = "linux")]
pub fn drop_cap_sys_nice() -> bool {
    let mut hdr = CapHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    let mut data = [CapData::default(); 2];
    // SAFETY: header and two data slots match the v3 capget/capset ABI.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capget,
            &mut hdr as *mut CapHeader,
            data.as_mut_ptr(),
        )
    };
    if rc != 0 {
        return false;
    }
    let bit = 1u32 << CAP_SYS_NICE;
    data[0].effective &= !bit;
    data[0].permitted &= !bit;
    data[0].inheritable &= !bit;
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &mut hdr as *mut CapHeader,
            data.as_ptr(),
        )
    };
    rc == 0
}
