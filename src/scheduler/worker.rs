//! Per-thread runtime: setup, rendezvous, timed bursts, exit.
//!
//! # State machine
//!
//! ```text
//! Created ──► WaitingAtBarrier ──► Running ──► Yielded ──► Running ... ──► Exited
//!    │                │                │
//!    └── setup fail   └── aborted      └── clock failure ──────────────────► Exited
//! ```
//!
//! # Bursts
//!
//! A burst spins on the monotonic clock until the elapsed time strictly
//! exceeds the configured duration. The thread stays runnable the whole time,
//! so a `SCHED_FIFO` worker keeps the core against any equal or lower
//! priority thread until the `sched_yield` that ends the burst. Replacing the
//! spin with a sleep would make policy and priority invisible.
//!
//! # Setup handshake
//!
//! Before arriving at the barrier the worker pins itself (if asked), applies
//! its scheduling attributes and sends one [`SetupReport`] to the controller.
//! The controller only arrives, and so only releases the barrier, after every
//! report came back `Ok`.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use super::affinity::pin_current_thread_to_core;
use super::barrier::StartBarrier;
use super::clock::Clock;
use super::output_sink::OutputSink;
use super::policy::SchedAttrs;
use super::rusage::{rusage_thread, ProcUsageDelta};
use super::trace::{TraceClock, TraceEvent, TraceKind, WorkerTrace};
use crate::config::{AffinityMode, ThreadConfig};
use crate::error::HarnessError;

/// Lifecycle of one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    WaitingAtBarrier,
    Running,
    Yielded,
    Exited,
}

impl WorkerState {
    /// Legal transitions. Any live state may jump to `Exited` on failure.
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Created, WaitingAtBarrier)
                | (WaitingAtBarrier, Running)
                | (Running, Yielded)
                | (Yielded, Running)
                | (Created | WaitingAtBarrier | Running | Yielded, Exited)
        )
    }
}

#[derive(Debug)]
struct StateCell(WorkerState);

impl StateCell {
    #[inline]
    fn advance(&mut self, next: WorkerState) {
        debug_assert!(
            self.0.can_advance_to(next),
            "illegal worker transition {:?} -> {:?}",
            self.0,
            next
        );
        self.0 = next;
    }
}

/// Setup status sent to the controller before the barrier.
#[derive(Debug)]
pub struct SetupReport {
    pub worker: usize,
    pub result: Result<(), HarnessError>,
}

/// What a worker reports on join.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub id: usize,
    /// Always `Exited` once the thread returns, including after a setup
    /// failure or an aborted barrier; check `error` and `bursts_completed`.
    pub state: WorkerState,
    pub bursts_completed: usize,
    /// Core the worker actually pinned to.
    pub pinned: Option<usize>,
    /// Wall time spent in each completed burst.
    pub burst_elapsed: Vec<Duration>,
    /// CPU time and context switches of this thread from release to exit.
    pub cpu: ProcUsageDelta,
    pub events: Vec<TraceEvent>,
    /// Failure after setup (clock read, barrier abort).
    pub error: Option<HarnessError>,
}

impl WorkerOutcome {
    #[inline]
    pub fn exited_cleanly(&self) -> bool {
        self.state == WorkerState::Exited && self.error.is_none()
    }
}

/// Everything a worker thread needs, moved into it at spawn.
pub struct WorkerCtx<C> {
    pub cfg: ThreadConfig,
    pub attrs: SchedAttrs,
    pub bursts: usize,
    pub affinity_mode: AffinityMode,
    pub barrier: Arc<StartBarrier>,
    pub trace: Arc<TraceClock<C>>,
    pub sink: Option<Arc<dyn OutputSink>>,
    pub setup_tx: Sender<SetupReport>,
}

/// Spins until `clock` shows more than `burst` elapsed since the first read.
///
/// Returns the measured elapsed time.
pub fn busy_wait<C: Clock + ?Sized>(clock: &C, burst: Duration) -> io::Result<Duration> {
    let start = clock.now()?;
    loop {
        let elapsed = clock.now()?.saturating_sub(start);
        if elapsed > burst {
            return Ok(elapsed);
        }
        std::hint::spin_loop();
    }
}

/// Thread body for one worker.
pub fn run_worker<C: Clock>(ctx: WorkerCtx<C>) -> WorkerOutcome {
    let WorkerCtx {
        cfg,
        attrs,
        bursts,
        affinity_mode,
        barrier,
        trace,
        sink,
        setup_tx,
    } = ctx;

    let mut state = StateCell(WorkerState::Created);
    let mut outcome = WorkerOutcome {
        id: cfg.id,
        state: WorkerState::Created,
        bursts_completed: 0,
        pinned: None,
        burst_elapsed: Vec::with_capacity(bursts),
        cpu: ProcUsageDelta::default(),
        events: Vec::new(),
        error: None,
    };

    let setup = setup_current_thread(&cfg, &attrs, affinity_mode);
    let setup_ok = setup.is_ok();
    outcome.pinned = setup.as_ref().ok().copied().flatten();
    let report = SetupReport {
        worker: cfg.id,
        result: setup.map(|_| ()),
    };
    // A closed channel means the controller is gone; nobody will release us.
    if setup_tx.send(report).is_err() || !setup_ok {
        state.advance(WorkerState::Exited);
        outcome.state = state.0;
        return outcome;
    }
    drop(setup_tx);

    state.advance(WorkerState::WaitingAtBarrier);
    if let Err(e) = barrier.arrive_and_wait_then(|| trace.record_release()) {
        debug!(worker = cfg.id, error = %e, "start barrier did not release");
        state.advance(WorkerState::Exited);
        outcome.state = state.0;
        outcome.error = Some(e.into());
        return outcome;
    }

    let usage_start = rusage_thread();
    let line = format!("Thread {} is running\n", cfg.id);
    let mut buf = WorkerTrace::with_capacity(2 * bursts + 1);

    for burst in 0..bursts {
        state.advance(WorkerState::Running);
        buf.push(trace.stamp(TraceKind::BurstBegin {
            worker: cfg.id,
            burst,
        }));
        if let Some(sink) = &sink {
            sink.write_line(line.as_bytes());
        }

        match busy_wait(trace.clock(), cfg.burst) {
            Ok(elapsed) => outcome.burst_elapsed.push(elapsed),
            Err(e) => {
                warn!(worker = cfg.id, burst, error = %e, "clock read failed; worker stops");
                outcome.error = Some(HarnessError::unavailable(
                    format!("monotonic clock in worker {}", cfg.id),
                    e,
                ));
                break;
            }
        }

        buf.push(trace.stamp(TraceKind::BurstEnd {
            worker: cfg.id,
            burst,
        }));
        outcome.bursts_completed += 1;

        state.advance(WorkerState::Yielded);
        thread::yield_now();
    }

    buf.push(trace.stamp(TraceKind::WorkerExited { worker: cfg.id }));
    outcome.cpu = rusage_thread().since(&usage_start);
    state.advance(WorkerState::Exited);
    outcome.state = state.0;
    outcome.events = buf.into_events();
    outcome
}

/// Pins (if configured) and applies scheduling attributes.
///
/// Returns the core actually pinned to.
fn setup_current_thread(
    cfg: &ThreadConfig,
    attrs: &SchedAttrs,
    mode: AffinityMode,
) -> Result<Option<usize>, HarnessError> {
    let mut pinned = None;
    if let Some(core) = cfg.pin {
        match pin_current_thread_to_core(core) {
            Ok(()) => pinned = Some(core),
            Err(e) => match mode {
                AffinityMode::Strict => {
                    return Err(HarnessError::unavailable(
                        format!("pin worker {} to core {core}", cfg.id),
                        e,
                    ))
                }
                AffinityMode::AllowUnpinned => {
                    warn!(worker = cfg.id, core, error = %e, "pin failed; running unpinned");
                }
            },
        }
    }
    attrs.apply_to_current()?;
    Ok(pinned)
}
