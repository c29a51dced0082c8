//! Scheduling benchmark: FIFO vs normal threads on one core.
//!
//! ## Scope
//! Creates N worker threads, gives each a scheduling class (`SCHED_FIFO` or
//! `SCHED_OTHER`) and priority, releases them together through a start
//! barrier, and drives each through a fixed number of CPU-bound bursts
//! separated by `sched_yield`. The trace of burst starts shows how the
//! kernel arbitrated between them.
//!
//! ## Key invariants
//! - Setup is fail-fast: if any worker cannot be pinned or given its policy,
//!   no worker runs a burst and every created thread is joined.
//! - The start barrier releases exactly once, and its release is sequenced
//!   before every burst in the trace.
//! - Bursts spin on a monotonic clock; they never sleep.
//!
//! ## Flow
//! `Cli -> HarnessConfig -> Harness::run -> (per worker) pin + SchedAttrs ->
//! StartBarrier -> bursts -> RunReport`
//!
//! ## Notable entry points
//! - [`HarnessConfig::from_lists`]: the list-based configuration contract.
//! - [`Harness`] / [`RunReport`]: run a benchmark and inspect the timeline.
//! - [`scheduler::StartBarrier`]: the rendezvous primitive on its own.

pub mod cli;
pub mod config;
pub mod error;
pub mod scheduler;

pub use config::{
    AffinityMode, HarnessConfig, PinScope, Priority, SchedClass, ThreadConfig, DEFAULT_BURSTS,
};
pub use error::{HarnessError, Result};
pub use scheduler::{Harness, RunReport, Timeline, TraceEvent, TraceKind};
