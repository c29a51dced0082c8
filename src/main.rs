//! `sched-demo`: run the scheduling benchmark from the command line.
//!
//! # Output
//!
//! stdout: `Thread <id> is running` each time a worker begins a burst, in the
//! order workers reached the output lock. That can differ from the trace
//! under preemption; `--trace-json` carries the authoritative burst order.
//!
//! stderr: diagnostics (`RUST_LOG`, default `warn`) and one summary line:
//! `workers=N bursts=N elapsed_ms=N user_ms=N sys_ms=N max_rss_kib=N nvcsw=N nivcsw=N failed=N`
//!
//! # Exit Codes
//!
//! - `0`: every worker completed all bursts
//! - `1`: setup failed (no burst ran) or a worker failed mid-run
//! - `2`: invalid arguments

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sched_bench::cli::Cli;
use sched_bench::scheduler::{OutputSink, StdoutSink};
use sched_bench::Harness;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let trace_json = cli.trace_json.clone();

    let cfg = match cli.into_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let sink = Arc::new(StdoutSink::new());
    let report = match Harness::new(cfg).with_sink(sink.clone()).run() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_permission_denied() {
                eprintln!("hint: FIFO scheduling needs CAP_SYS_NICE (try sudo)");
            }
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    sink.flush();

    if let Some(path) = trace_json {
        let written = File::create(&path)
            .and_then(|f| report.timeline.write_json_lines(BufWriter::new(f)));
        if let Err(e) = written {
            eprintln!("error: writing trace to {}: {e}", path.display());
            return ExitCode::from(1);
        }
    }

    eprintln!("{}", report.summary());

    if report.failed().next().is_some() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
