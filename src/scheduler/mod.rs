//! Scheduling benchmark runtime.
//!
//! # Layout
//!
//! - `policy`: SCHED_FIFO / SCHED_OTHER attributes per worker
//! - `affinity`: single-core pinning
//! - `barrier`: single-use start rendezvous (N workers + controller)
//! - `worker`: burst loop and setup handshake
//! - `harness`: controller tying the above together
//! - `trace`, `output_sink`: observation of the run
//! - `clock`, `rusage`: time and resource measurement
//!
//! # Invariants
//!
//! - No worker starts a burst before the barrier releases, and the barrier
//!   releases only after every worker applied its attributes.
//! - The barrier and the trace sequencer are the only state shared between
//!   workers; everything else a worker touches it owns.

pub mod affinity;
pub mod barrier;
pub mod clock;
pub mod harness;
pub mod output_sink;
pub mod policy;
pub mod rusage;
pub mod trace;
pub mod worker;

pub use barrier::{Arrival, BarrierError, StartBarrier};
pub use clock::{Clock, MonotonicClock};
pub use harness::{Harness, RunReport};
pub use output_sink::{NullSink, OutputSink, StdoutSink, VecSink};
pub use policy::{realtime_permitted, SchedAttrs};
pub use trace::{Timeline, TraceEvent, TraceKind};
pub use worker::{WorkerOutcome, WorkerState};
