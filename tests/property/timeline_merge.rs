//! Property tests for merging per-worker traces into one timeline.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use sched_bench::scheduler::trace::{TraceClock, WorkerTrace};
use sched_bench::scheduler::MonotonicClock;
use sched_bench::{Timeline, TraceKind};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn merged_timeline_is_strictly_ordered_and_complete(
        bursts in prop::collection::vec(1usize..6, 1..6),
    ) {
        let clock = Arc::new(TraceClock::new(MonotonicClock).unwrap());
        clock.record_release();

        let handles: Vec<_> = bursts
            .iter()
            .copied()
            .enumerate()
            .map(|(worker, n)| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || {
                    let mut t = WorkerTrace::with_capacity(2 * n + 1);
                    for burst in 0..n {
                        t.push(clock.stamp(TraceKind::BurstBegin { worker, burst }));
                        thread::yield_now();
                        t.push(clock.stamp(TraceKind::BurstEnd { worker, burst }));
                    }
                    t.push(clock.stamp(TraceKind::WorkerExited { worker }));
                    t
                })
            })
            .collect();
        let traces: Vec<WorkerTrace> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let timeline = Timeline::merge(clock.release(), traces.into_iter().map(WorkerTrace::into_events));
        let events = timeline.events();

        prop_assert_eq!(events[0].kind, TraceKind::BarrierReleased);
        for pair in events.windows(2) {
            prop_assert!(pair[0].seq < pair[1].seq);
        }
        let expected: usize = 1 + bursts.iter().map(|n| 2 * n + 1).sum::<usize>();
        prop_assert_eq!(timeline.len(), expected);
        for (worker, &n) in bursts.iter().enumerate() {
            prop_assert_eq!(timeline.burst_count(worker), n);
        }
    }
}
