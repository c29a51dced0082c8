//! Command-line surface for `sched-demo`.
//!
//! # Grammar
//!
//! ```text
//! sched-demo -n <THREADS> -t <SECONDS> -s <FIFO|NORMAL,...> -p <PRIO,...>
//!            [--cpu <CORE>] [--pin <all|workers|controller|none>]
//!            [--allow-unpinned] [--bursts <N>] [--trace-json <PATH>] [--quiet]
//! ```
//!
//! `-n` is the only source of the thread count. Everything beyond shape
//! checks happens in [`HarnessConfig::from_lists`], so the library enforces
//! the same rules when driven without this parser.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AffinityMode, HarnessConfig, PinScope, DEFAULT_BURSTS};
use crate::error::Result;
use crate::scheduler::affinity::first_allowed_cpu;

/// Run worker threads under FIFO / NORMAL scheduling and trace their bursts.
#[derive(Debug, Parser)]
#[command(name = "sched-demo", version, about)]
pub struct Cli {
    /// Number of worker threads.
    #[arg(short = 'n', long = "num-threads")]
    pub threads: usize,

    /// Busy-wait length of each burst, in seconds (shared by all workers).
    #[arg(short = 't', long = "time-wait")]
    pub time_wait: f64,

    /// Scheduling class per thread, comma-separated (FIFO or NORMAL).
    #[arg(short = 's', long = "policies")]
    pub policies: String,

    /// Priority per thread, comma-separated; -1 keeps the platform default.
    #[arg(short = 'p', long = "priorities", allow_hyphen_values = true)]
    pub priorities: String,

    /// Core to confine the run to [default: first CPU this process may use].
    #[arg(long)]
    pub cpu: Option<usize>,

    /// Which execution contexts are pinned to the core.
    #[arg(long, default_value = "all")]
    pub pin: PinScope,

    /// Keep running unpinned if pinning is refused (policy effects may be
    /// diluted across cores).
    #[arg(long)]
    pub allow_unpinned: bool,

    /// Bursts per worker.
    #[arg(long, default_value_t = DEFAULT_BURSTS)]
    pub bursts: usize,

    /// Write the merged trace as JSON lines to this file.
    #[arg(long, value_name = "PATH")]
    pub trace_json: Option<PathBuf>,

    /// Do not print `Thread N is running` lines.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Converts parsed arguments into a validated harness configuration.
    pub fn into_config(self) -> Result<HarnessConfig> {
        let mut cfg =
            HarnessConfig::from_lists(self.threads, self.time_wait, &self.policies, &self.priorities)?
                .with_bursts(self.bursts)?
                .with_echo(!self.quiet)
                .with_affinity_mode(if self.allow_unpinned {
                    AffinityMode::AllowUnpinned
                } else {
                    AffinityMode::Strict
                });
        if self.pin != PinScope::None {
            let core = self.cpu.or_else(first_allowed_cpu).unwrap_or(0);
            cfg = cfg.pin_to(core, self.pin);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
