use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sched_bench::scheduler::{realtime_permitted, VecSink};
use sched_bench::{Harness, HarnessConfig, HarnessError, Priority, TraceEvent, TraceKind};

#[cfg(target_os = "linux")]
use crate::common::{drop_cap_sys_nice, CountingClock};
use crate::common::{on_one_core, run_isolated};

#[test]
fn every_worker_exits() {
    for n in [1usize, 2, 5, 8] {
        let classes = vec!["NORMAL"; n].join(",");
        let prios = vec!["-1"; n].join(",");
        let cfg = HarnessConfig::from_lists(n, 0.001, &classes, &prios).unwrap();
        let (res, _) = run_isolated(cfg);
        let report = res.unwrap();
        assert_eq!(report.exited_count(), n, "n={n}");
        assert_eq!(report.outcomes.len(), n);
        let ids: Vec<usize> = report.outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, (0..n).collect::<Vec<_>>());
    }
}

#[test]
fn no_burst_before_release() {
    let cfg = HarnessConfig::from_lists(4, 0.002, "NORMAL,NORMAL,NORMAL,NORMAL", "-1,-1,-1,-1")
        .unwrap();
    let (res, _) = run_isolated(cfg);
    let report = res.unwrap();

    let events = report.timeline.events();
    let release_idx = events
        .iter()
        .position(|e| e.kind == TraceKind::BarrierReleased)
        .expect("release recorded");
    let first_burst_idx = events
        .iter()
        .position(|e| matches!(e.kind, TraceKind::BurstBegin { .. }))
        .expect("bursts recorded");
    assert_eq!(release_idx, 0);
    assert!(release_idx < first_burst_idx);
}

#[test]
fn each_worker_bursts_exactly_three_times() {
    let cfg = HarnessConfig::from_lists(3, 0.002, "NORMAL,NORMAL,NORMAL", "-1,5,-1").unwrap();
    let (res, sink) = run_isolated(cfg);
    let report = res.unwrap();

    for id in 0..3 {
        assert_eq!(report.timeline.burst_count(id), 3, "worker {id}");
        let bursts: Vec<usize> = report
            .timeline
            .burst_begins()
            .filter(|&(w, _)| w == id)
            .map(|(_, b)| b)
            .collect();
        assert_eq!(bursts, vec![0, 1, 2]);
    }
    let lines = sink.lines();
    assert_eq!(lines.len(), 9);
    for id in 0..3 {
        let expected = format!("Thread {id} is running");
        assert_eq!(lines.iter().filter(|l| **l == expected).count(), 3);
    }
}

#[test]
fn reference_configuration_produces_nine_bursts() {
    let cfg = HarnessConfig::from_lists(3, 0.2, "FIFO,NORMAL,FIFO", "50,-1,20").unwrap();
    let cfg = on_one_core(cfg.clone()).unwrap_or(cfg);
    let (res, sink) = run_isolated(cfg);

    match res {
        Ok(report) => {
            assert_eq!(report.timeline.burst_begins().count(), 9);
            assert_eq!(report.exited_count(), 3);
            assert_eq!(sink.lines().len(), 9);
            for o in &report.outcomes {
                assert!(o.burst_elapsed.iter().all(|d| d.as_secs_f64() > 0.2));
            }
        }
        Err(e) => {
            // Without real-time rights the whole run is refused up front.
            assert!(e.is_permission_denied(), "unexpected error: {e}");
            assert!(sink.is_empty());

            let fallback =
                HarnessConfig::from_lists(3, 0.2, "NORMAL,NORMAL,NORMAL", "50,-1,20").unwrap();
            let (res, _) = run_isolated(fallback);
            assert_eq!(res.unwrap().timeline.burst_begins().count(), 9);
        }
    }
}

#[test]
fn short_priority_list_is_rejected_without_threads() {
    let err = HarnessConfig::from_lists(2, 0.1, "FIFO,FIFO", "10").unwrap_err();
    assert!(matches!(err, HarnessError::InvalidArgument(_)));
}

#[test]
fn setup_error_leaves_no_output() {
    let mut cfg = HarnessConfig::from_lists(3, 0.001, "NORMAL,NORMAL,FIFO", "-1,-1,-1").unwrap();
    cfg.threads[2].priority = Priority::Explicit(100_000);
    let (res, sink) = run_isolated(cfg);
    assert!(matches!(res.unwrap_err(), HarnessError::InvalidArgument(_)));
    assert!(sink.is_empty());
}

#[test]
fn json_trace_round_trips_through_file() {
    let cfg = HarnessConfig::from_lists(2, 0.001, "NORMAL,NORMAL", "-1,-1")
        .unwrap()
        .with_echo(false);
    let (res, _) = run_isolated(cfg);
    let report = res.unwrap();

    let tmp = tempfile::NamedTempFile::new().unwrap();
    report
        .timeline
        .write_json_lines(std::fs::File::create(tmp.path()).unwrap())
        .unwrap();

    let text = std::fs::read_to_string(tmp.path()).unwrap();
    let parsed: Vec<TraceEvent> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(parsed, report.timeline.events());
}

#[test]
#[cfg(target_os = "linux")]
fn refused_fifo_is_reported_before_any_worker_spawns() {
    std::thread::spawn(|| {
        if !drop_cap_sys_nice() {
            eprintln!("skipping: capset unavailable");
            return;
        }
        if realtime_permitted() {
            eprintln!("skipping: RLIMIT_RTPRIO still grants SCHED_FIFO");
            return;
        }

        let reads = Arc::new(AtomicU64::new(0));
        let sink = Arc::new(VecSink::new());
        let cfg = HarnessConfig::from_lists(3, 0.01, "NORMAL,NORMAL,FIFO", "-1,-1,50").unwrap();
        let err = Harness::with_clock(cfg, CountingClock(Arc::clone(&reads)))
            .with_sink(sink.clone())
            .run()
            .unwrap_err();

        assert!(err.is_permission_denied(), "unexpected error: {err}");
        assert!(err.to_string().contains("worker 2"));
        assert_eq!(err.exit_code(), 1);
        // The trace clock is started right before the spawn loop.
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert!(sink.is_empty());
    })
    .join()
    .unwrap();
}
