//! Globally sequenced trace of barrier release and burst activity.
//!
//! Each worker appends to its own buffer; the only shared state is the
//! [`TraceClock`], which hands out sequence numbers from one atomic counter.
//! Merging the buffers by `seq` after join reproduces the order in which the
//! events were observed, across all workers.
//!
//! Trace events are observations only. Nothing in the harness branches on
//! them.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use super::clock::Clock;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceKind {
    /// The last party arrived; every worker may start.
    BarrierReleased,
    BurstBegin { worker: usize, burst: usize },
    BurstEnd { worker: usize, burst: usize },
    WorkerExited { worker: usize },
}

impl TraceKind {
    /// Worker the event belongs to; `None` for the barrier release.
    #[inline]
    pub fn worker(&self) -> Option<usize> {
        match *self {
            Self::BarrierReleased => None,
            Self::BurstBegin { worker, .. }
            | Self::BurstEnd { worker, .. }
            | Self::WorkerExited { worker } => Some(worker),
        }
    }
}

/// One observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TraceEvent {
    /// Global observation order; unique within a run.
    pub seq: u64,
    /// Microseconds since the trace epoch.
    pub at_us: u64,
    #[serde(flatten)]
    pub kind: TraceKind,
}

/// Shared sequencer and time base for one run.
pub struct TraceClock<C> {
    clock: C,
    epoch: Duration,
    next_seq: AtomicU64,
    release: OnceLock<TraceEvent>,
}

impl<C: Clock> TraceClock<C> {
    /// Starts the trace epoch now.
    pub fn new(clock: C) -> io::Result<Self> {
        let epoch = clock.now()?;
        Ok(Self {
            clock,
            epoch,
            next_seq: AtomicU64::new(0),
            release: OnceLock::new(),
        })
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Stamps `kind` with the next sequence number.
    ///
    /// A failed clock read stamps `at_us = 0`; ordering still comes from
    /// `seq`.
    pub fn stamp(&self, kind: TraceKind) -> TraceEvent {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let at_us = self
            .clock
            .now()
            .map(|now| now.saturating_sub(self.epoch).as_micros() as u64)
            .unwrap_or(0);
        TraceEvent { seq, at_us, kind }
    }

    /// Records the barrier release. Only the first call has an effect.
    pub fn record_release(&self) {
        let _ = self.release.get_or_init(|| self.stamp(TraceKind::BarrierReleased));
    }

    /// The release event, if the barrier released.
    #[inline]
    pub fn release(&self) -> Option<TraceEvent> {
        self.release.get().copied()
    }
}

/// Per-worker, append-only event buffer.
#[derive(Clone, Debug, Default)]
pub struct WorkerTrace {
    events: Vec<TraceEvent>,
}

impl WorkerTrace {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            events: Vec::with_capacity(cap),
        }
    }

    #[inline]
    pub fn push(&mut self, ev: TraceEvent) {
        debug_assert!(self.events.last().map_or(true, |last| last.seq < ev.seq));
        self.events.push(ev);
    }

    #[inline]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[inline]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

/// Merged, sequence-ordered view of a whole run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<TraceEvent>,
}

impl Timeline {
    /// Merges per-worker buffers plus the release event.
    pub fn merge<I>(release: Option<TraceEvent>, workers: I) -> Self
    where
        I: IntoIterator<Item = Vec<TraceEvent>>,
    {
        let mut events: Vec<TraceEvent> = release.into_iter().collect();
        for w in workers {
            events.extend(w);
        }
        events.sort_unstable_by_key(|e| e.seq);
        Self { events }
    }

    #[inline]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn release(&self) -> Option<&TraceEvent> {
        self.events
            .iter()
            .find(|e| e.kind == TraceKind::BarrierReleased)
    }

    /// Burst-begin events in observation order, as `(worker, burst)`.
    pub fn burst_begins(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.events.iter().filter_map(|e| match e.kind {
            TraceKind::BurstBegin { worker, burst } => Some((worker, burst)),
            _ => None,
        })
    }

    /// Number of burst-begin events for `worker`.
    pub fn burst_count(&self, worker: usize) -> usize {
        self.burst_begins().filter(|&(w, _)| w == worker).count()
    }

    /// Worker ids in the order their bursts began.
    pub fn burst_order(&self) -> Vec<usize> {
        self.burst_begins().map(|(w, _)| w).collect()
    }

    /// Writes one JSON object per line.
    pub fn write_json_lines<W: Write>(&self, mut out: W) -> io::Result<()> {
        for ev in &self.events {
            serde_json::to_writer(&mut out, ev)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}
