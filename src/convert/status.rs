use serde::{Deserialize, Serialize};

/// Outcome category of a single test result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCategory {
    Success,
    Failure,
    Skipped,
    Unknown,
    Custom,
}

/// Classified status, serialized as `{"category": ..., "detail": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatus {
    pub category: StatusCategory,
    pub detail: String,
}

/// Detail attached to an absent or empty status.
pub const UNKNOWN_STATUS_DETAIL: &str = "undefined";

const STATUS_TABLE: &[(&str, StatusCategory)] = &[
    ("success", StatusCategory::Success),
    ("succeed", StatusCategory::Success),
    ("succeeded", StatusCategory::Success),
    ("pass", StatusCategory::Success),
    ("passed", StatusCategory::Success),
    ("system-out", StatusCategory::Success),
    ("skip", StatusCategory::Skipped),
    ("skipped", StatusCategory::Skipped),
    ("disable", StatusCategory::Skipped),
    ("disabled", StatusCategory::Skipped),
    ("ignore", StatusCategory::Skipped),
    ("ignored", StatusCategory::Skipped),
    ("fail", StatusCategory::Failure),
    ("failed", StatusCategory::Failure),
    ("failure", StatusCategory::Failure),
    ("error", StatusCategory::Failure),
    ("errored", StatusCategory::Failure),
];

/// Maps a raw status string to its category, case-insensitively.
///
/// Matching is exact after lowercasing, so surrounding whitespace makes a
/// status `Custom`. Unrecognized strings keep the original text as detail;
/// absent or empty strings become `Unknown` with detail `"undefined"`.
pub fn classify_status(raw: Option<&str>) -> TestStatus {
    let raw = match raw {
        Some(s) if !s.is_empty() => s,
        _ => {
            return TestStatus {
                category: StatusCategory::Unknown,
                detail: UNKNOWN_STATUS_DETAIL.to_string(),
            }
        }
    };

    let lowered = raw.to_lowercase();
    let category = STATUS_TABLE
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, category)| *category)
        .unwrap_or(StatusCategory::Custom);

    TestStatus {
        category,
        detail: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_aliases() {
        for (raw, expected) in [
            ("passed", StatusCategory::Success),
            ("SUCCESS", StatusCategory::Success),
            ("system-out", StatusCategory::Success),
            ("Skip", StatusCategory::Skipped),
            ("ignored", StatusCategory::Skipped),
            ("failed", StatusCategory::Failure),
            ("Error", StatusCategory::Failure),
        ] {
            let status = classify_status(Some(raw));
            assert_eq!(status.category, expected, "{}", raw);
            assert_eq!(status.detail, raw);
        }
    }

    #[test]
    fn test_unrecognized_is_custom() {
        assert_eq!(
            classify_status(Some("flaky")),
            TestStatus {
                category: StatusCategory::Custom,
                detail: "flaky".to_string()
            }
        );
    }

    #[test]
    fn test_absent_or_empty_is_unknown() {
        for raw in [None, Some("")] {
            assert_eq!(
                classify_status(raw),
                TestStatus {
                    category: StatusCategory::Unknown,
                    detail: "undefined".to_string()
                }
            );
        }
    }

    #[test]
    fn test_whitespace_is_not_trimmed() {
        for raw in [" passed ", "Failed\n", "   "] {
            assert_eq!(
                classify_status(Some(raw)),
                TestStatus {
                    category: StatusCategory::Custom,
                    detail: raw.to_string()
                },
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(classify_status(Some("fail"))).unwrap();
        assert_eq!(value, json!({"category": "Failure", "detail": "fail"}));
    }
}
