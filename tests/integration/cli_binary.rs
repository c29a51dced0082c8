use std::process::Command;

fn sched_demo() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sched-demo"))
}

#[test]
fn mismatched_lists_exit_with_usage_code() {
    let output = sched_demo()
        .args(["-n", "2", "-t", "0.01", "-s", "NORMAL,NORMAL", "-p", "-1"])
        .output()
        .expect("failed to run sched-demo");

    assert_eq!(
        output.status.code(),
        Some(2),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());
}

#[test]
fn unknown_class_is_rejected() {
    let output = sched_demo()
        .args(["-n", "1", "-t", "0.01", "-s", "RR", "-p", "-1"])
        .output()
        .expect("failed to run sched-demo");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn normal_run_prints_every_burst() {
    let output = sched_demo()
        .args(["-n", "2", "-t", "0.01", "-s", "NORMAL,NORMAL", "-p", "-1,-1", "--pin", "none"])
        .output()
        .expect("failed to run sched-demo");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    for id in 0..2 {
        let line = format!("Thread {id} is running");
        assert_eq!(stdout.lines().filter(|l| *l == line).count(), 3, "{stdout}");
    }
}

#[test]
fn quiet_run_writes_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("trace.jsonl");

    let output = sched_demo()
        .args(["-n", "1", "-t", "0.01", "-s", "NORMAL", "-p", "-1", "--pin", "none", "-q"])
        .arg("--trace-json")
        .arg(&trace)
        .output()
        .expect("failed to run sched-demo");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());

    let text = std::fs::read_to_string(&trace).unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["kind"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("barrier_released"));
    assert_eq!(kinds.iter().filter(|k| *k == "burst_begin").count(), 3);
    assert_eq!(kinds.last().map(String::as_str), Some("worker_exited"));
}
