use super::*;
use crate::record::RawRecord;
use crate::state::StreamState;
use chrono::TimeZone;
use serde_json::json;

fn record(value: Value) -> RawRecord {
    RawRecord::from_value(value).unwrap()
}

fn ts(s: &str) -> CursorValue {
    CursorValue::Timestamp(DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc))
}

#[test]
fn test_number_parsing() {
    assert_eq!(
        CursorValue::from_json(&json!(17), CursorKind::Number),
        Some(CursorValue::Integer(17))
    );
    assert_eq!(
        CursorValue::from_json(&json!(1.5), CursorKind::Number),
        Some(CursorValue::Float(1.5))
    );
    assert_eq!(
        CursorValue::from_json(&json!(" 42 "), CursorKind::Number),
        Some(CursorValue::Integer(42))
    );
    assert_eq!(CursorValue::from_json(&json!("abc"), CursorKind::Number), None);
    assert_eq!(CursorValue::from_json(&json!(true), CursorKind::Number), None);
}

#[test]
fn test_timestamp_parsing() {
    let parsed = CursorValue::from_json(&json!("2024-03-01T10:00:00+02:00"), CursorKind::Timestamp);
    assert_eq!(parsed, Some(ts("2024-03-01T08:00:00Z")));

    let naive = CursorValue::from_json(&json!("2024-03-01T08:00:00.000"), CursorKind::Timestamp);
    assert_eq!(naive, Some(ts("2024-03-01T08:00:00Z")));

    let millis = CursorValue::from_json(&json!(1_709_280_000_000i64), CursorKind::Timestamp);
    assert_eq!(
        millis,
        Some(CursorValue::Timestamp(Utc.timestamp_opt(1_709_280_000, 0).unwrap()))
    );

    assert_eq!(CursorValue::from_json(&json!("yesterday"), CursorKind::Timestamp), None);
}

#[test]
fn test_ordering_within_and_across_kinds() {
    assert!(CursorValue::Integer(2) > CursorValue::Integer(1));
    assert!(CursorValue::Float(2.5) > CursorValue::Integer(2));
    assert_eq!(CursorValue::Integer(3), CursorValue::Float(3.0));
    assert!(ts("2024-01-02T00:00:00Z") > ts("2024-01-01T23:59:59Z"));
    assert_eq!(
        CursorValue::Integer(1).partial_cmp(&ts("2024-01-01T00:00:00Z")),
        None
    );
}

#[test]
fn test_serde_untagged_roundtrip() {
    let values = vec![
        CursorValue::Integer(10),
        CursorValue::Float(0.25),
        ts("2024-05-05T05:05:05Z"),
    ];
    let json = serde_json::to_string(&values).unwrap();
    let back: Vec<CursorValue> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, values);
    assert_eq!(back[2].kind(), CursorKind::Timestamp);
}

#[test]
fn test_advance_ignores_smaller_and_incomparable() {
    let mut slot = None;
    assert!(advance(&mut slot, CursorValue::Integer(5)));
    assert!(!advance(&mut slot, CursorValue::Integer(3)));
    assert!(!advance(&mut slot, CursorValue::Integer(5)));
    assert!(!advance(&mut slot, ts("2030-01-01T00:00:00Z")));
    assert!(advance(&mut slot, CursorValue::Integer(9)));
    assert_eq!(slot, Some(CursorValue::Integer(9)));
}

#[test]
fn test_tracker_watermark_is_max_of_initial_and_observed() {
    let initial = StreamState::default().with_watermark("updated_on", CursorValue::Integer(50));
    let mut tracker = CursorTracker::new("updated_on", CursorKind::Number, None, &initial);

    let mut previous = tracker.current_watermark().cloned();
    for v in [10, 70, 30, 65, 90, 20] {
        tracker.observe(&record(json!({ "updated_on": v })));
        let current = tracker.current_watermark().cloned();
        assert!(current >= previous, "watermark decreased");
        previous = current;
    }

    assert_eq!(tracker.current_watermark(), Some(&CursorValue::Integer(90)));
}

#[test]
fn test_tracker_initial_dominates_older_records() {
    let initial = StreamState::default().with_watermark("updated_on", CursorValue::Integer(100));
    let mut tracker = CursorTracker::new("updated_on", CursorKind::Number, None, &initial);
    tracker.observe(&record(json!({ "updated_on": 1 })));
    tracker.observe(&record(json!({ "updated_on": 99 })));
    assert_eq!(tracker.current_watermark(), Some(&CursorValue::Integer(100)));
}

#[test]
fn test_tracker_without_initial_starts_empty() {
    let mut tracker =
        CursorTracker::new("created_at", CursorKind::Timestamp, None, &StreamState::default());
    assert!(tracker.current_watermark().is_none());

    tracker.observe(&record(json!({ "other": 1 })));
    tracker.observe(&record(json!({ "created_at": "not a date" })));
    assert!(tracker.current_watermark().is_none());

    tracker.observe(&record(json!({ "created_at": "2024-02-02T00:00:00Z" })));
    assert_eq!(tracker.current_watermark(), Some(&ts("2024-02-02T00:00:00Z")));
}

#[test]
fn test_tracker_partitions() {
    let mut tracker = CursorTracker::new(
        "updated_on",
        CursorKind::Number,
        Some("suite_id".to_string()),
        &StreamState::default(),
    );
    tracker.observe(&record(json!({ "suite_id": 1, "updated_on": 10 })));
    tracker.observe(&record(json!({ "suite_id": 2, "updated_on": 40 })));
    tracker.observe(&record(json!({ "suite_id": 1, "updated_on": 5 })));
    tracker.observe(&record(json!({ "suite_id": 1, "updated_on": 20 })));

    assert_eq!(tracker.current_watermark(), Some(&CursorValue::Integer(40)));

    let state = tracker.snapshot();
    assert_eq!(state.watermark("updated_on"), Some(&CursorValue::Integer(40)));
    assert_eq!(state.partitions.len(), 2);
    assert_eq!(state.partitions.get("1"), Some(&CursorValue::Integer(20)));
    assert_eq!(state.partitions.get("2"), Some(&CursorValue::Integer(40)));
}
