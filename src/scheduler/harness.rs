//! Controller: builds workers, releases them together, collects outcomes.
//!
//! # Run phases
//!
//! ```text
//!  validate ─► build SchedAttrs ─► probe FIFO ─► check cores ─► pin controller
//!      │              │                │              │               │
//!      └──────────────┴────────────────┴── InvalidArgument / PermissionDenied /
//!                                          ResourceUnavailable (no workers yet)
//!
//!  spawn N workers ─► collect N SetupReports ─► arrive (release) ─► join N
//!          │                    │
//!          └── spawn error      └── any Err ─► abort barrier ─► join ─► return Err
//! ```
//!
//! # Fail-fast guarantee
//!
//! Real-time privilege is probed from the controller before any worker is
//! spawned, so a missing `CAP_SYS_NICE` is reported without creating one.
//! Each worker still applies its own attributes in-thread and reports back.
//!
//! The controller is the N+1th party of the start barrier and arrives only
//! after every worker reported a successful setup. Until then the barrier
//! cannot release, so a setup failure anywhere means no worker ever starts a
//! burst. Teardown aborts the barrier (waking every worker already waiting)
//! and joins all created threads before the error is returned.
//!
//! # Controller affinity
//!
//! When the controller is pinned, its previous mask is restored after the
//! run, so embedding the harness in a larger program does not leave the
//! calling thread stuck on one core.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use super::affinity::{allowed_cpus, check_core_allowed, pin_current_thread_to_core, CpuSet};
use super::barrier::StartBarrier;
use super::clock::{Clock, MonotonicClock};
use super::output_sink::OutputSink;
use super::policy::{probe_realtime, SchedAttrs};
use super::rusage::{rusage_self, ProcUsageDelta};
use super::trace::{TraceClock, Timeline};
use super::worker::{run_worker, SetupReport, WorkerCtx, WorkerOutcome};
use crate::config::{AffinityMode, HarnessConfig};
use crate::error::{HarnessError, Result};

/// Result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// One entry per worker, ordered by id.
    pub outcomes: Vec<WorkerOutcome>,
    /// All trace events in observation order.
    pub timeline: Timeline,
    /// Release to last join.
    pub elapsed: Duration,
    /// Process usage across the same window.
    pub usage: ProcUsageDelta,
}

impl RunReport {
    /// Workers that reached `Exited` without a runtime error.
    pub fn exited_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.exited_cleanly()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &WorkerOutcome> + '_ {
        self.outcomes.iter().filter(|o| !o.exited_cleanly())
    }

    pub fn total_bursts(&self) -> usize {
        self.outcomes.iter().map(|o| o.bursts_completed).sum()
    }

    /// One-line `key=value` summary for stderr.
    pub fn summary(&self) -> String {
        format!(
            "workers={} bursts={} elapsed_ms={} {} failed={}",
            self.outcomes.len(),
            self.total_bursts(),
            self.elapsed.as_millis(),
            self.usage,
            self.failed().count()
        )
    }
}

/// The benchmark controller.
pub struct Harness<C = MonotonicClock> {
    cfg: HarnessConfig,
    clock: C,
    sink: Option<Arc<dyn OutputSink>>,
}

impl Harness<MonotonicClock> {
    pub fn new(cfg: HarnessConfig) -> Self {
        Self::with_clock(cfg, MonotonicClock)
    }
}

impl<C: Clock + 'static> Harness<C> {
    /// Uses `clock` for burst timing and trace timestamps.
    pub fn with_clock(cfg: HarnessConfig, clock: C) -> Self {
        Self {
            cfg,
            clock,
            sink: None,
        }
    }

    /// Destination for `Thread N is running` lines. Ignored unless
    /// `HarnessConfig::echo` is set.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[inline]
    pub fn config(&self) -> &HarnessConfig {
        &self.cfg
    }

    /// Runs the benchmark to completion.
    ///
    /// # Errors
    ///
    /// Any setup error; when one is returned, no worker ran a burst and every
    /// created thread has been joined.
    ///
    /// # Panics
    ///
    /// Re-raises the first worker panic after all workers are joined.
    pub fn run(self) -> Result<RunReport> {
        let Harness { cfg, clock, sink } = self;
        cfg.validate()?;

        let attrs = cfg
            .threads
            .iter()
            .map(SchedAttrs::for_config)
            .collect::<Result<Vec<_>>>()?;

        probe_realtime(&attrs)?;
        preflight_cores(&cfg)?;
        let _controller_pin = match cfg.controller_pin {
            Some(core) => ControllerPin::apply(core, cfg.affinity_mode)?,
            None => None,
        };

        let trace = Arc::new(
            TraceClock::new(clock)
                .map_err(|e| HarnessError::unavailable("monotonic clock", e))?,
        );
        let n = cfg.worker_count();
        let barrier = Arc::new(StartBarrier::new(n + 1));
        let sink = if cfg.echo { sink } else { None };
        let (setup_tx, setup_rx) = crossbeam_channel::bounded::<SetupReport>(n);

        let mut handles: Vec<JoinHandle<WorkerOutcome>> = Vec::with_capacity(n);
        for (tcfg, attrs) in cfg.threads.iter().cloned().zip(attrs) {
            let id = tcfg.id;
            let ctx = WorkerCtx {
                cfg: tcfg,
                attrs,
                bursts: cfg.bursts_per_worker,
                affinity_mode: cfg.affinity_mode,
                barrier: Arc::clone(&barrier),
                trace: Arc::clone(&trace),
                sink: sink.clone(),
                setup_tx: setup_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("sched-worker-{id}"))
                .spawn(move || run_worker(ctx));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    teardown(&barrier, handles);
                    return Err(HarnessError::unavailable(format!("spawn worker {id}"), e));
                }
            }
        }
        drop(setup_tx);

        if let Err(e) = collect_setup(&setup_rx, n) {
            warn!(error = %e, "setup failed; aborting before release");
            teardown(&barrier, handles);
            return Err(e);
        }

        let usage_start = rusage_self();
        let release_clock = trace.clock().now().ok();
        barrier.arrive_and_wait_then(|| trace.record_release())?;
        info!(workers = n, "start barrier released");

        let mut outcomes = Vec::with_capacity(n);
        let mut panic = None;
        for h in handles {
            match h.join() {
                Ok(o) => outcomes.push(o),
                Err(p) => {
                    panic.get_or_insert(p);
                }
            }
        }
        if let Some(p) = panic {
            std::panic::resume_unwind(p);
        }

        let elapsed = match (release_clock, trace.clock().now().ok()) {
            (Some(a), Some(b)) => b.saturating_sub(a),
            _ => Duration::ZERO,
        };
        let usage = rusage_self().since(&usage_start);
        outcomes.sort_by_key(|o| o.id);
        let timeline = Timeline::merge(
            trace.release(),
            outcomes.iter_mut().map(|o| std::mem::take(&mut o.events)),
        );

        for o in outcomes.iter().filter(|o| !o.exited_cleanly()) {
            if let Some(e) = &o.error {
                warn!(worker = o.id, error = %e, "worker did not finish all bursts");
            }
        }
        info!(bursts = timeline.burst_begins().count(), "run complete");

        Ok(RunReport {
            outcomes,
            timeline,
            elapsed,
            usage,
        })
    }
}

/// Waits for one report per worker; returns the first failure.
///
/// A worker that dies before reporting closes its sender; once every sender
/// is gone with reports missing, the run cannot release and is treated as a
/// setup failure.
fn collect_setup(rx: &Receiver<SetupReport>, n: usize) -> Result<()> {
    for received in 0..n {
        match rx.recv() {
            Ok(SetupReport { result: Ok(()), worker }) => {
                debug!(worker, "worker ready");
            }
            Ok(SetupReport { result: Err(e), .. }) => return Err(e),
            Err(_) => {
                return Err(HarnessError::unavailable(
                    "worker setup",
                    std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        format!("only {received} of {n} workers reported setup"),
                    ),
                ))
            }
        }
    }
    Ok(())
}

/// Aborts the barrier and joins every created worker.
///
/// A worker that panicked during setup is logged with its payload; the
/// setup error being returned stays the one reported to the caller.
fn teardown(barrier: &StartBarrier, handles: Vec<JoinHandle<WorkerOutcome>>) -> usize {
    barrier.abort();
    let mut panicked = 0;
    for h in handles {
        let name = h.thread().name().unwrap_or("sched-worker").to_owned();
        if let Err(payload) = h.join() {
            panicked += 1;
            warn!(thread = %name, panic = %panic_message(payload), "worker panicked before release");
        }
    }
    panicked
}

/// Format panic payloads into a stable message.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload".to_string()
    }
}

/// Verifies every requested core up front.
///
/// Strict mode turns a bad core into `ResourceUnavailable` before any thread
/// exists; the permissive mode only warns and lets each context fall back.
fn preflight_cores(cfg: &HarnessConfig) -> Result<()> {
    let mut cores: Vec<usize> = cfg
        .threads
        .iter()
        .filter_map(|t| t.pin)
        .chain(cfg.controller_pin)
        .collect();
    cores.sort_unstable();
    cores.dedup();

    for core in cores {
        if let Err(e) = check_core_allowed(core) {
            match cfg.affinity_mode {
                AffinityMode::Strict => {
                    return Err(HarnessError::unavailable(format!("core {core}"), e))
                }
                AffinityMode::AllowUnpinned => {
                    warn!(core, error = %e, "core unavailable; affected contexts run unpinned")
                }
            }
        }
    }
    Ok(())
}

/// Restores the controller's original mask on drop.
struct ControllerPin {
    previous: CpuSet,
}

impl ControllerPin {
    fn apply(core: usize, mode: AffinityMode) -> Result<Option<Self>> {
        let previous = match allowed_cpus() {
            Ok(set) => set,
            Err(e) => return Self::degrade(core, mode, e),
        };
        match pin_current_thread_to_core(core) {
            Ok(()) => {
                debug!(core, "controller pinned");
                Ok(Some(Self { previous }))
            }
            Err(e) => Self::degrade(core, mode, e),
        }
    }

    fn degrade(core: usize, mode: AffinityMode, e: std::io::Error) -> Result<Option<Self>> {
        match mode {
            AffinityMode::Strict => Err(HarnessError::unavailable(
                format!("pin controller to core {core}"),
                e,
            )),
            AffinityMode::AllowUnpinned => {
                warn!(core, error = %e, "controller pin failed; running unpinned");
                Ok(None)
            }
        }
    }
}

impl Drop for ControllerPin {
    fn drop(&mut self) {
        if let Err(e) = self.previous.apply() {
            warn!(error = %e, "could not restore controller affinity");
        }
    }
}
