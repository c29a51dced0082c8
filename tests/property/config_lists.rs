//! Property tests for the comma-separated argument lists.

use proptest::prelude::*;

use sched_bench::config::{parse_classes, parse_priorities};
use sched_bench::{HarnessConfig, HarnessError, Priority, SchedClass};

fn class_strategy() -> impl Strategy<Value = SchedClass> {
    prop_oneof![Just(SchedClass::Fifo), Just(SchedClass::Normal)]
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Unset), (0i32..=99).prop_map(Priority::Explicit)]
}

fn raw_priority(p: Priority) -> String {
    match p {
        Priority::Unset => "-1".to_owned(),
        Priority::Explicit(v) => v.to_string(),
    }
}

proptest! {
    #[test]
    fn lists_of_matching_length_zip_in_order(
        entries in prop::collection::vec((class_strategy(), priority_strategy()), 1..32),
        millis in 1u64..5_000,
    ) {
        let classes = entries.iter().map(|(c, _)| c.to_string()).collect::<Vec<_>>().join(",");
        let prios = entries.iter().map(|(_, p)| raw_priority(*p)).collect::<Vec<_>>().join(",");
        let secs = millis as f64 / 1000.0;

        let cfg = HarnessConfig::from_lists(entries.len(), secs, &classes, &prios).unwrap();
        prop_assert_eq!(cfg.worker_count(), entries.len());
        for (i, t) in cfg.threads.iter().enumerate() {
            prop_assert_eq!(t.id, i);
            prop_assert_eq!(t.class, entries[i].0);
            prop_assert_eq!(t.priority, entries[i].1);
            prop_assert_eq!(t.burst, cfg.threads[0].burst);
            prop_assert_eq!(t.pin, None);
        }
        prop_assert!(cfg.validate().is_ok());
    }

    #[test]
    fn length_mismatch_is_always_invalid(
        n in 1usize..16,
        classes_len in 1usize..16,
        prios_len in 1usize..16,
    ) {
        prop_assume!(classes_len != n || prios_len != n);
        let classes = vec!["NORMAL"; classes_len].join(",");
        let prios = vec!["-1"; prios_len].join(",");
        let err = HarnessConfig::from_lists(n, 0.01, &classes, &prios).unwrap_err();
        prop_assert!(matches!(err, HarnessError::InvalidArgument(_)));
        prop_assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn whitespace_around_tokens_is_ignored(
        prios in prop::collection::vec(priority_strategy(), 1..16),
        pad in "[ \t]{0,3}",
    ) {
        let raw = prios
            .iter()
            .map(|p| format!("{pad}{}{pad}", raw_priority(*p)))
            .collect::<Vec<_>>()
            .join(",");
        prop_assert_eq!(parse_priorities(&raw).unwrap(), prios);
    }

    #[test]
    fn negative_priorities_other_than_unset_are_rejected(p in i32::MIN..-1) {
        prop_assert!(parse_priorities(&p.to_string()).is_err());
    }

    #[test]
    fn unknown_class_names_are_rejected(name in "[a-zA-Z]{1,8}") {
        prop_assume!(name != "FIFO" && name != "NORMAL");
        prop_assert!(parse_classes(&name).is_err());
    }

    #[test]
    fn non_positive_bursts_are_rejected(secs in prop_oneof![
        Just(0.0f64),
        Just(f64::NAN),
        Just(f64::INFINITY),
        -1.0e6f64..0.0,
    ]) {
        let err = HarnessConfig::from_lists(1, secs, "NORMAL", "-1").unwrap_err();
        prop_assert!(matches!(err, HarnessError::InvalidArgument(_)));
    }
}
