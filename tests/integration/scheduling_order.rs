//! Observable scheduling order with every context on one core.

use sched_bench::HarnessConfig;

use crate::common::{on_one_core, realtime_ready, run_isolated};

#[test]
fn higher_fifo_priority_runs_all_bursts_first() {
    if !realtime_ready() {
        return;
    }
    let cfg = HarnessConfig::from_lists(2, 0.05, "FIFO,FIFO", "10,80").unwrap();
    let cfg = on_one_core(cfg).expect("pinnable core");
    let (res, _) = run_isolated(cfg);
    let report = res.unwrap();

    let order = report.timeline.burst_order();
    assert_eq!(order.len(), 6);
    let first_low = order.iter().position(|&w| w == 0).unwrap();
    let high_before = order[..first_low].iter().filter(|&&w| w == 1).count();
    assert_eq!(high_before, 3, "order was {order:?}");
}

#[test]
fn fifo_outranks_normal() {
    if !realtime_ready() {
        return;
    }
    let cfg = HarnessConfig::from_lists(2, 0.05, "NORMAL,FIFO", "-1,-1").unwrap();
    let cfg = on_one_core(cfg).expect("pinnable core");
    let (res, _) = run_isolated(cfg);
    let order = res.unwrap().timeline.burst_order();
    assert_eq!(&order[..3], &[1, 1, 1], "order was {order:?}");
}

#[test]
fn normal_workers_on_one_core_interleave() {
    let cfg = HarnessConfig::from_lists(2, 0.1, "NORMAL,NORMAL", "-1,-1").unwrap();
    let Some(cfg) = on_one_core(cfg) else {
        eprintln!("skipping: CPU affinity unavailable");
        return;
    };
    let (res, _) = run_isolated(cfg);
    let report = res.unwrap();

    let order = report.timeline.burst_order();
    assert_eq!(order.len(), 6);
    assert!(
        order[..3] != [0, 0, 0] && order[..3] != [1, 1, 1],
        "one worker finished before the other started: {order:?}"
    );
}
