//! Property tests for event log filtering.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use dirsync::eventlog::{LogFilter, LogRecord};

fn record(offset_secs: i64, path: &str) -> LogRecord {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    LogRecord {
        timestamp: (base + Duration::seconds(offset_secs)).to_rfc3339(),
        worker_id: 0,
        event_type: "Modify".to_string(),
        event_path: path.to_string(),
        action: "Copied file to /backup".to_string(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: A time window keeps exactly the records inside it, bounds included.
    #[test]
    fn property_window_is_inclusive(
        offsets in proptest::collection::vec(0i64..10_000, 0..20),
        a in 0i64..10_000,
        b in 0i64..10_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let from = record(lo, "").timestamp;
        let to = record(hi, "").timestamp;
        let filter = LogFilter::new(None, Some(&from), Some(&to)).unwrap();

        let records: Vec<_> = offsets.iter().map(|o| record(*o, "/hot/x")).collect();
        let kept = filter.apply(records).len();
        let expected = offsets.iter().filter(|o| (lo..=hi).contains(*o)).count();
        prop_assert_eq!(kept, expected);
    }

    /// PROPERTY: Filtering never reorders or invents records.
    #[test]
    fn property_filter_preserves_order(
        paths in proptest::collection::vec("[a-c]{1,4}", 0..20),
        needle in "[a-c]{1,2}",
    ) {
        let records: Vec<_> = paths.iter().enumerate().map(|(i, p)| record(i as i64, p)).collect();
        let filter = LogFilter::new(Some(&needle), None, None).unwrap();
        let kept = filter.apply(records.clone());

        let expected: Vec<_> = records.into_iter().filter(|r| r.event_path.contains(&needle)).collect();
        prop_assert_eq!(kept, expected);
    }
}
