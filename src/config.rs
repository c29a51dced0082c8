//! Harness configuration: typed per-thread records built from list arguments.
//!
//! # Input contract
//!
//! - thread count: positive integer, the single authoritative count
//! - burst duration: seconds, finite and `> 0`, shared by every worker
//! - classes: comma-separated `FIFO` / `NORMAL`, one per thread
//! - priorities: comma-separated integers, one per thread, `-1` = unset
//!
//! Policy and priority arrive as separate lists but are zipped into one
//! `Vec<ThreadConfig>` here, after both lengths are checked against the thread
//! count. Nothing downstream indexes parallel arrays.
//!
//! The burst duration is uniform: one value is copied into each
//! `ThreadConfig`. The record still carries it per thread so the worker loop
//! does not reach into shared configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Bursts each worker runs before exiting.
pub const DEFAULT_BURSTS: usize = 3;

/// Upper bound on workers; far above anything one core can meaningfully host.
pub const MAX_WORKERS: usize = 4096;

/// Command-line token for "leave the priority at the platform default".
pub const PRIORITY_UNSET_TOKEN: i32 = -1;

/// OS scheduling class requested for a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedClass {
    /// Real-time first-in-first-out (`SCHED_FIFO`).
    Fifo,
    /// Default time-shared policy (`SCHED_OTHER`).
    Normal,
}

impl FromStr for SchedClass {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FIFO" => Ok(Self::Fifo),
            "NORMAL" => Ok(Self::Normal),
            other => Err(HarnessError::invalid(format!(
                "unknown scheduling class '{other}' (expected FIFO or NORMAL)"
            ))),
        }
    }
}

impl fmt::Display for SchedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => f.write_str("FIFO"),
            Self::Normal => f.write_str("NORMAL"),
        }
    }
}

/// Requested priority. `Unset` keeps the platform default for the policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Unset,
    Explicit(i32),
}

impl Priority {
    /// Decodes the command-line integer form (`-1` = unset).
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            PRIORITY_UNSET_TOKEN => Ok(Self::Unset),
            p if p < 0 => Err(HarnessError::invalid(format!(
                "priority {p} is negative (use -1 for the platform default)"
            ))),
            p => Ok(Self::Explicit(p)),
        }
    }

    #[inline]
    pub fn explicit(self) -> Option<i32> {
        match self {
            Self::Unset => None,
            Self::Explicit(p) => Some(p),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("default"),
            Self::Explicit(p) => write!(f, "{p}"),
        }
    }
}

/// Per-worker configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Unique 0-based sequence number.
    pub id: usize,
    pub class: SchedClass,
    /// Only meaningful for `SchedClass::Fifo`.
    pub priority: Priority,
    /// Busy-wait length of one burst.
    pub burst: Duration,
    /// Core this worker pins itself to before reaching the barrier.
    pub pin: Option<usize>,
}

/// What happens when an affinity request is refused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AffinityMode {
    /// Pin failure is a setup error (`ResourceUnavailable`).
    #[default]
    Strict,
    /// Pin failure is logged and the context runs unpinned.
    ///
    /// Contention between workers is no longer confined to one core, so
    /// policy effects may be diluted. Opt-in only.
    AllowUnpinned,
}

/// Which execution contexts are pinned to the benchmark core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PinScope {
    /// Controller and every worker.
    #[default]
    All,
    Workers,
    /// Controller only; workers inherit its mask at spawn time.
    Controller,
    None,
}

impl PinScope {
    #[inline]
    pub fn pins_workers(self) -> bool {
        matches!(self, Self::All | Self::Workers)
    }

    #[inline]
    pub fn pins_controller(self) -> bool {
        matches!(self, Self::All | Self::Controller)
    }
}

impl FromStr for PinScope {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "workers" => Ok(Self::Workers),
            "controller" => Ok(Self::Controller),
            "none" => Ok(Self::None),
            other => Err(HarnessError::invalid(format!(
                "unknown pin scope '{other}' (expected all, workers, controller or none)"
            ))),
        }
    }
}

/// Complete, validated harness configuration.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub threads: Vec<ThreadConfig>,
    pub bursts_per_worker: usize,
    pub controller_pin: Option<usize>,
    pub affinity_mode: AffinityMode,
    /// Print `Thread N is running` lines as bursts begin.
    pub echo: bool,
}

impl HarnessConfig {
    /// Builds a configuration from the raw list arguments.
    ///
    /// Fails with `InvalidArgument` on malformed tokens or when either list
    /// length differs from `thread_count`. No pinning is configured; use
    /// [`HarnessConfig::pin_to`] to add it.
    pub fn from_lists(
        thread_count: usize,
        burst_secs: f64,
        classes: &str,
        priorities: &str,
    ) -> Result<Self> {
        if thread_count == 0 {
            return Err(HarnessError::invalid("thread count must be >= 1"));
        }
        if thread_count > MAX_WORKERS {
            return Err(HarnessError::invalid(format!(
                "thread count {thread_count} exceeds maximum {MAX_WORKERS}"
            )));
        }
        let burst = parse_burst(burst_secs)?;
        let classes = parse_classes(classes)?;
        let priorities = parse_priorities(priorities)?;

        if classes.len() != thread_count {
            return Err(HarnessError::invalid(format!(
                "expected {thread_count} scheduling classes, got {}",
                classes.len()
            )));
        }
        if priorities.len() != thread_count {
            return Err(HarnessError::invalid(format!(
                "expected {thread_count} priorities, got {}",
                priorities.len()
            )));
        }

        let threads = classes
            .into_iter()
            .zip(priorities)
            .enumerate()
            .map(|(id, (class, priority))| ThreadConfig {
                id,
                class,
                priority,
                burst,
                pin: None,
            })
            .collect();

        Ok(Self {
            threads,
            bursts_per_worker: DEFAULT_BURSTS,
            controller_pin: None,
            affinity_mode: AffinityMode::Strict,
            echo: true,
        })
    }

    /// Pins the contexts selected by `scope` to `core`.
    pub fn pin_to(mut self, core: usize, scope: PinScope) -> Self {
        let worker_pin = scope.pins_workers().then_some(core);
        for t in &mut self.threads {
            t.pin = worker_pin;
        }
        self.controller_pin = scope.pins_controller().then_some(core);
        self
    }

    pub fn with_affinity_mode(mut self, mode: AffinityMode) -> Self {
        self.affinity_mode = mode;
        self
    }

    pub fn with_bursts(mut self, bursts: usize) -> Result<Self> {
        if bursts == 0 {
            return Err(HarnessError::invalid("bursts per worker must be >= 1"));
        }
        self.bursts_per_worker = bursts;
        Ok(self)
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Re-checks invariants that hold for any configuration the builders
    /// produce; catches hand-assembled configs with misnumbered ids.
    pub fn validate(&self) -> Result<()> {
        if self.threads.is_empty() {
            return Err(HarnessError::invalid("at least one worker is required"));
        }
        if self.bursts_per_worker == 0 {
            return Err(HarnessError::invalid("bursts per worker must be >= 1"));
        }
        for (idx, t) in self.threads.iter().enumerate() {
            if t.id != idx {
                return Err(HarnessError::invalid(format!(
                    "worker ids must be sequential: position {idx} has id {}",
                    t.id
                )));
            }
            if t.burst.is_zero() {
                return Err(HarnessError::invalid(format!(
                    "worker {idx} has a zero burst duration"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.threads.len()
    }
}

/// Splits a comma-separated list, rejecting empty input and empty tokens.
///
/// Surrounding whitespace on each token is ignored.
fn split_list<'a>(raw: &'a str, what: &str) -> Result<Vec<&'a str>> {
    if raw.trim().is_empty() {
        return Err(HarnessError::invalid(format!("{what} list is empty")));
    }
    raw.split(',')
        .enumerate()
        .map(|(i, tok)| {
            let tok = tok.trim();
            if tok.is_empty() {
                Err(HarnessError::invalid(format!(
                    "{what} list has an empty entry at position {i}"
                )))
            } else {
                Ok(tok)
            }
        })
        .collect()
}

/// Parses `FIFO,NORMAL,...`.
pub fn parse_classes(raw: &str) -> Result<Vec<SchedClass>> {
    split_list(raw, "scheduling class")?
        .into_iter()
        .map(str::parse)
        .collect()
}

/// Parses `50,-1,20,...`.
pub fn parse_priorities(raw: &str) -> Result<Vec<Priority>> {
    split_list(raw, "priority")?
        .into_iter()
        .map(|tok| {
            let n: i32 = tok
                .parse()
                .map_err(|_| HarnessError::invalid(format!("priority '{tok}' is not an integer")))?;
            Priority::from_raw(n)
        })
        .collect()
}

/// Converts a seconds value into a burst duration.
pub fn parse_burst(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(HarnessError::invalid(format!(
            "burst duration must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| HarnessError::invalid(format!("burst duration {secs}s: {e}")))
}
