//! Error taxonomy for harness setup and worker execution.
//!
//! Setup errors (`InvalidArgument`, `PermissionDenied`, most
//! `ResourceUnavailable`) are fatal to the run and surface before any worker
//! starts a burst. A `ResourceUnavailable` raised while a worker is already
//! running (clock failure) is confined to that worker's outcome.
//!
//! OS errors keep their `io::Error` source so `errno` stays visible in
//! diagnostics.

use std::io;

use thiserror::Error;

use crate::scheduler::barrier::BarrierError;

/// Errors produced by the benchmark harness.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// Malformed or inconsistent configuration. No threads were created.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform refused a real-time policy or priority.
    #[error("permission denied for worker {worker}: {detail}")]
    PermissionDenied { worker: usize, detail: String },

    /// A platform resource (affinity, thread, clock) could not be obtained.
    #[error("resource unavailable ({context}): {source}")]
    ResourceUnavailable {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The start barrier was aborted or used after release.
    #[error("start barrier: {0}")]
    Barrier(#[from] BarrierError),
}

impl HarnessError {
    /// Creates an `InvalidArgument` from anything printable.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a `ResourceUnavailable` with a short context label.
    #[inline]
    pub fn unavailable(context: impl Into<String>, source: io::Error) -> Self {
        Self::ResourceUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Maps an OS error from a scheduling call to the matching variant.
    ///
    /// `EPERM` means the caller lacks `CAP_SYS_NICE` (or an RLIMIT_RTPRIO
    /// allowance); everything else is treated as a resource failure.
    pub fn from_sched_errno(worker: usize, err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::EPERM)
            || err.kind() == io::ErrorKind::PermissionDenied
        {
            Self::PermissionDenied {
                worker,
                detail: err.to_string(),
            }
        } else {
            Self::unavailable(format!("scheduling attributes for worker {worker}"), err)
        }
    }

    /// Process exit code for the CLI: 2 for bad input, 1 for platform failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 2,
            _ => 1,
        }
    }

    /// True for `PermissionDenied`.
    #[inline]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
