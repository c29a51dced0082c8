//! CPU affinity: confine execution contexts to one core.
//!
//! # Purpose
//!
//! With every worker on the same core, the scheduler has to choose between
//! them at each yield and preemption point. Spread across cores they would
//! simply run in parallel and policy/priority would have no visible effect.
//!
//! # Platform Support
//!
//! - **Linux**: `pthread_setaffinity_np` / `sched_getaffinity`
//! - **Other**: `Unsupported` error (never a silent success)
//!
//! # Container/Cgroup Awareness
//!
//! A process in a cpuset may only run on a subset of host CPUs. Pick cores
//! with [`first_allowed_cpu`] / [`allowed_cpus`], not by index into the host
//! CPU list: pinning to a core outside the allowed set fails with `EINVAL`.

use std::io;

use tracing::warn;

/// Maximum number of CPUs representable in a `cpu_set_t`.
#[cfg(target_os = "linux")]
pub const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(not(target_os = "linux"))]
pub const CPU_SET_CAPACITY: usize = 1024;

#[inline]
fn validate_core(core: usize) -> io::Result<()> {
    if core >= CPU_SET_CAPACITY {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "core index {} exceeds CPU_SET_CAPACITY ({})",
                core, CPU_SET_CAPACITY
            ),
        ));
    }
    Ok(())
}

/// Pins the calling thread to `core`.
///
/// # Errors
///
/// - `core >= CPU_SET_CAPACITY`
/// - core outside the process's allowed set, or permission denied
/// - platform without thread affinity
#[cfg(target_os = "linux")]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;
    let mut set = CpuSet::new();
    set.set(core)?;
    set.apply()
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread_to_core(_core: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU affinity is not supported on this platform",
    ))
}

/// CPUs the calling thread may run on (respects cgroups/taskset).
#[cfg(target_os = "linux")]
pub fn allowed_cpus() -> io::Result<CpuSet> {
    let mut set = CpuSet::new();
    // SAFETY: pid 0 = calling thread; the mask is a valid, sized cpu_set_t.
    let rc = unsafe {
        libc::sched_getaffinity(
            0,
            std::mem::size_of::<libc::cpu_set_t>(),
            &mut set.inner as *mut _,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(set)
}

#[cfg(not(target_os = "linux"))]
pub fn allowed_cpus() -> io::Result<CpuSet> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "allowed_cpus() is not supported on this platform",
    ))
}

/// Lowest-numbered allowed CPU, if the platform can tell.
pub fn first_allowed_cpu() -> Option<usize> {
    let allowed = allowed_cpus().ok()?;
    let first = allowed.iter().next();
    first
}

/// Checks that `core` is one this process may pin to, without pinning.
///
/// Lets the harness fail before any worker exists instead of inside one.
pub fn check_core_allowed(core: usize) -> io::Result<()> {
    validate_core(core)?;
    let allowed = allowed_cpus()?;
    if !allowed.is_set(core) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "core {} is not in the allowed CPU set {:?}",
                core,
                allowed.iter().collect::<Vec<_>>()
            ),
        ));
    }
    Ok(())
}

/// Available parallelism, falling back to 1.
pub fn num_cpus() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!(error = %e, "could not determine CPU count, assuming 1");
            1
        }
    }
}

// ============================================================================
// CpuSet
// ============================================================================

/// CPU affinity mask (`cpu_set_t` on Linux, empty stub elsewhere).
#[derive(Clone, Debug)]
pub struct CpuSet {
    #[cfg(target_os = "linux")]
    inner: libc::cpu_set_t,

    #[cfg(not(target_os = "linux"))]
    _private: (),
}

impl CpuSet {
    pub fn new() -> Self {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: an all-zero cpu_set_t is the empty set.
            let mut inner: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            unsafe { libc::CPU_ZERO(&mut inner) };
            Self { inner }
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self { _private: () }
        }
    }

    /// Adds `core`; errors if out of range.
    #[cfg(target_os = "linux")]
    pub fn set(&mut self, core: usize) -> io::Result<()> {
        validate_core(core)?;
        // SAFETY: bounds checked above.
        unsafe { libc::CPU_SET(core, &mut self.inner) };
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn set(&mut self, core: usize) -> io::Result<()> {
        validate_core(core)
    }

    /// Membership test; `false` for out-of-range cores.
    #[cfg(target_os = "linux")]
    pub fn is_set(&self, core: usize) -> bool {
        if core >= CPU_SET_CAPACITY {
            return false;
        }
        // SAFETY: bounds checked above.
        unsafe { libc::CPU_ISSET(core, &self.inner) }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn is_set(&self, _core: usize) -> bool {
        false
    }

    #[cfg(target_os = "linux")]
    pub fn count(&self) -> usize {
        // SAFETY: CPU_COUNT only reads the mask.
        unsafe { libc::CPU_COUNT(&self.inner) as usize }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn count(&self) -> usize {
        0
    }

    /// Applies this mask to the calling thread.
    #[cfg(target_os = "linux")]
    pub fn apply(&self) -> io::Result<()> {
        // SAFETY: valid mask and size; the call returns the error code directly.
        let rc = unsafe {
            libc::pthread_setaffinity_np(
                libc::pthread_self(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &self.inner as *const _,
            )
        };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn apply(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "CPU affinity is not supported on this platform",
        ))
    }

    /// Set core indices in ascending order. O(CPU_SET_CAPACITY).
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CPU_SET_CAPACITY).filter(move |&core| self.is_set(core))
    }
}

impl Default for CpuSet {
    fn default() -> Self {
        Self::new()
    }
}
