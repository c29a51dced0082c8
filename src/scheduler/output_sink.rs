//! Live output for burst announcements.
//!
//! Each worker formats its `Thread N is running\n` line once, before the
//! first burst, and hands it to the sink at every burst start. The sink takes
//! its lock only for the write. Lines from different workers never interleave
//! at the byte level; their order is the order in which workers acquired the
//! lock, which is not necessarily the trace order.
//!
//! # Flushing
//!
//! [`StdoutSink`] is line-buffered so announcements show up while the run is
//! in progress. A worker spinning under `SCHED_FIFO` would otherwise sit on a
//! full buffer until exit, hiding exactly the ordering the benchmark exists
//! to show.
//!
//! # Panic policy
//!
//! I/O errors panic, except `BrokenPipe` on stdout, which is ignored
//! (`sched-demo ... | head`).

use std::io::{self, ErrorKind, LineWriter, Write};
use std::sync::Mutex;

/// Line-oriented sink shared by all workers.
pub trait OutputSink: Send + Sync + 'static {
    /// Writes one complete line (including the trailing newline).
    fn write_line(&self, bytes: &[u8]);

    /// Flushes buffered data. Call after workers are joined.
    fn flush(&self);
}

/// Line-buffered stdout.
pub struct StdoutSink {
    out: Mutex<LineWriter<io::Stdout>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(LineWriter::new(io::stdout())),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn write_line(&self, bytes: &[u8]) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = out.write_all(bytes) {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("stdout write failed: {}", e);
        }
    }

    fn flush(&self) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = out.flush() {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("stdout flush failed: {}", e);
        }
    }
}

/// Captures lines in memory (tests).
pub struct VecSink {
    buf: Mutex<Vec<u8>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(Vec::new()),
        }
    }

    /// Extracts captured bytes, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        let mut g = self.buf.lock().expect("vec sink mutex poisoned");
        std::mem::take(&mut *g)
    }

    /// Captured output split into lines.
    pub fn lines(&self) -> Vec<String> {
        let g = self.buf.lock().expect("vec sink mutex poisoned");
        String::from_utf8_lossy(&g)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().expect("vec sink mutex poisoned").is_empty()
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for VecSink {
    fn write_line(&self, bytes: &[u8]) {
        self.buf
            .lock()
            .expect("vec sink mutex poisoned")
            .extend_from_slice(bytes);
    }

    fn flush(&self) {}
}

/// Discards everything.
#[derive(Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&self, _bytes: &[u8]) {}

    fn flush(&self) {}
}
