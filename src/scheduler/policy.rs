//! Scheduling attributes: policy + priority for one worker.
//!
//! # Creation-time application
//!
//! `std::thread` offers no hook for `pthread_attr_t`, so attributes are
//! validated up front ([`SchedAttrs::for_config`], before any thread exists)
//! and applied by the new thread as its very first action
//! ([`SchedAttrs::apply_to_current`]), before it reaches the start barrier.
//! The controller does not release the barrier until every worker has
//! reported a successful apply, so no burst ever runs under a partial or
//! failed attribute set.
//!
//! Privilege is checked before that: [`SchedAttrs::probe`] applies the same
//! attributes to a short-lived thread spawned by the controller, which
//! inherits the controller's capabilities. A refused `SCHED_FIFO` therefore
//! surfaces before any worker thread exists.
//!
//! # Policies
//!
//! | Class    | Policy        | Priority                                     |
//! |----------|---------------|----------------------------------------------|
//! | `Normal` | `SCHED_OTHER` | always 0; explicit values are ignored        |
//! | `Fifo`   | `SCHED_FIFO`  | explicit, or the policy minimum when unset   |
//!
//! `SCHED_FIFO` rejects priority 0, so "platform default" for FIFO resolves to
//! `sched_get_priority_min(SCHED_FIFO)` (1 on Linux).

use std::io;
use std::thread;

use tracing::debug;

use crate::config::{Priority, SchedClass, ThreadConfig};
use crate::error::{HarnessError, Result};

/// Inclusive priority bounds for a policy, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorityRange {
    pub min: i32,
    pub max: i32,
}

impl PriorityRange {
    #[inline]
    pub fn contains(&self, p: i32) -> bool {
        (self.min..=self.max).contains(&p)
    }
}

/// Raw `SCHED_*` constant for a class.
#[inline]
pub fn os_policy(class: SchedClass) -> libc::c_int {
    match class {
        SchedClass::Fifo => libc::SCHED_FIFO,
        SchedClass::Normal => libc::SCHED_OTHER,
    }
}

/// Maps a raw policy back to a class. `None` for policies the harness
/// never requests (`SCHED_RR`, `SCHED_BATCH`, ...).
pub fn class_of(policy: libc::c_int) -> Option<SchedClass> {
    match policy {
        libc::SCHED_FIFO => Some(SchedClass::Fifo),
        libc::SCHED_OTHER => Some(SchedClass::Normal),
        _ => None,
    }
}

/// Queries the platform's priority range for `class`.
pub fn priority_range(class: SchedClass) -> io::Result<PriorityRange> {
    let policy = os_policy(class);
    // SAFETY: plain syscalls with an integer argument; -1 signals error via errno.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(policy),
            libc::sched_get_priority_max(policy),
        )
    };
    if min == -1 || max == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(PriorityRange { min, max })
}

/// Validated scheduling attributes for one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedAttrs {
    worker: usize,
    class: SchedClass,
    policy: libc::c_int,
    priority: libc::c_int,
    explicit_priority: bool,
}

impl SchedAttrs {
    /// Builds the attribute set for `cfg`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if an explicit FIFO priority is outside the
    ///   platform range
    /// - `ResourceUnavailable` if the range cannot be queried
    pub fn for_config(cfg: &ThreadConfig) -> Result<Self> {
        match cfg.class {
            SchedClass::Normal => {
                if let Priority::Explicit(p) = cfg.priority {
                    debug!(worker = cfg.id, priority = p, "priority ignored for NORMAL class");
                }
                Ok(Self {
                    worker: cfg.id,
                    class: SchedClass::Normal,
                    policy: libc::SCHED_OTHER,
                    priority: 0,
                    explicit_priority: false,
                })
            }
            SchedClass::Fifo => {
                let range = priority_range(SchedClass::Fifo)
                    .map_err(|e| HarnessError::unavailable("SCHED_FIFO priority range", e))?;
                let (priority, explicit_priority) = match cfg.priority {
                    Priority::Unset => (range.min, false),
                    Priority::Explicit(p) if range.contains(p) => (p, true),
                    Priority::Explicit(p) => {
                        return Err(HarnessError::invalid(format!(
                            "worker {}: FIFO priority {p} outside platform range {}..={}",
                            cfg.id, range.min, range.max
                        )))
                    }
                };
                Ok(Self {
                    worker: cfg.id,
                    class: SchedClass::Fifo,
                    policy: libc::SCHED_FIFO,
                    priority,
                    explicit_priority,
                })
            }
        }
    }

    #[inline]
    pub fn class(&self) -> SchedClass {
        self.class
    }

    /// Priority that will be applied (policy default when not explicit).
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[inline]
    pub fn has_explicit_priority(&self) -> bool {
        self.explicit_priority
    }

    /// Applies the attributes to the calling thread.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` on `EPERM`, `ResourceUnavailable` otherwise.
    pub fn apply_to_current(&self) -> Result<()> {
        let param = libc::sched_param {
            sched_priority: self.priority,
        };
        // SAFETY: `param` is a valid sched_param for the duration of the call;
        // pthread_setschedparam returns the error code instead of using errno.
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), self.policy, &param) };
        if rc != 0 {
            return Err(HarnessError::from_sched_errno(
                self.worker,
                io::Error::from_raw_os_error(rc),
            ));
        }
        debug!(
            worker = self.worker,
            class = %self.class,
            priority = self.priority,
            explicit = self.explicit_priority,
            "scheduling attributes applied"
        );
        Ok(())
    }

    /// Applies these attributes to a throwaway thread and reports the result.
    ///
    /// The calling thread's own policy is untouched. The probe thread exits
    /// right after the apply.
    ///
    /// # Errors
    ///
    /// Same as [`apply_to_current`](Self::apply_to_current), plus
    /// `ResourceUnavailable` if the probe thread cannot be spawned.
    pub fn probe(&self) -> Result<()> {
        let attrs = *self;
        let handle = thread::Builder::new()
            .name("sched-probe".into())
            .spawn(move || attrs.apply_to_current())
            .map_err(|e| HarnessError::unavailable("spawn scheduling probe", e))?;
        match handle.join() {
            Ok(res) => res,
            Err(_) => Err(HarnessError::unavailable(
                "scheduling probe",
                io::Error::new(io::ErrorKind::Other, "probe thread panicked"),
            )),
        }
    }
}

/// Policy and priority the calling thread currently runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentPolicy {
    pub policy: libc::c_int,
    pub priority: i32,
}

impl CurrentPolicy {
    #[inline]
    pub fn class(&self) -> Option<SchedClass> {
        class_of(self.policy)
    }
}

/// Reads back the calling thread's policy and priority.
pub fn current_policy() -> io::Result<CurrentPolicy> {
    let mut policy: libc::c_int = 0;
    // SAFETY: zeroed sched_param is valid; both out-pointers are live locals.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(CurrentPolicy {
        policy,
        priority: param.sched_priority,
    })
}

/// Returns true if this process may switch a thread to `SCHED_FIFO`.
///
/// Probes on a throwaway thread so the caller's own policy is untouched.
pub fn realtime_permitted() -> bool {
    let Ok(range) = priority_range(SchedClass::Fifo) else {
        return false;
    };
    SchedAttrs {
        worker: 0,
        class: SchedClass::Fifo,
        policy: libc::SCHED_FIFO,
        priority: range.min,
        explicit_priority: false,
    }
    .probe()
    .is_ok()
}

/// Probes every distinct `SCHED_FIFO` attribute set in `attrs`.
///
/// `SCHED_OTHER` needs no privilege and is not probed. Returns the first
/// refusal, attributed to the first worker that asked for that priority.
pub fn probe_realtime(attrs: &[SchedAttrs]) -> Result<()> {
    let mut probed: Vec<i32> = Vec::new();
    for a in attrs.iter().filter(|a| a.class == SchedClass::Fifo) {
        if probed.contains(&a.priority) {
            continue;
        }
        probed.push(a.priority);
        a.probe()?;
    }
    Ok(())
}
