use super::*;
use crate::convert::ConvertError;
use serde_json::json;

fn raw(value: Value) -> RawRecord {
    RawRecord::from_value(value).unwrap()
}

#[test]
fn test_from_value_rejects_non_objects() {
    assert!(RawRecord::from_value(json!([1, 2])).is_none());
    assert!(RawRecord::from_value(json!("text")).is_none());
    assert!(RawRecord::from_value(json!({})).is_some());
}

#[test]
fn test_require_key_part_scalars() {
    let record = raw(json!({"name": "login", "job": 42, "flag": true}));
    assert_eq!(record.require_key_part("name").unwrap(), "login");
    assert_eq!(record.require_key_part("job").unwrap(), "42");
    assert_eq!(record.require_key_part("flag").unwrap(), "true");
}

#[test]
fn test_require_key_part_missing_or_empty() {
    let record = raw(json!({"empty": "", "null": null}));
    assert_eq!(
        record.require_key_part("absent"),
        Err(ConvertError::MissingField("absent".to_string()))
    );
    assert_eq!(
        record.require_key_part("empty"),
        Err(ConvertError::MissingField("empty".to_string()))
    );
    assert_eq!(
        record.require_key_part("null"),
        Err(ConvertError::MissingField("null".to_string()))
    );
}

#[test]
fn test_require_key_part_structured_value() {
    let record = raw(json!({"nested": {"a": 1}}));
    assert!(matches!(
        record.require_key_part("nested"),
        Err(ConvertError::InvalidField { .. })
    ));
}

#[test]
fn test_output_record_serializes_envelope() {
    let record = OutputRecord::new("qa_TestCase", json!({"uid": "c1"}));
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["modelKind"], "qa_TestCase");
    assert_eq!(value["payload"]["uid"], "c1");
}

#[test]
fn test_entity_ref() {
    assert_eq!(
        entity_ref("suite-1", "CircleCI"),
        json!({"uid": "suite-1", "source": "CircleCI"})
    );
}

#[test]
fn test_validate_accepts_model_kinds() {
    for kind in ["qa_TestCase", "qa_TestSuiteTestCaseAssociation", "cicd_Build"] {
        let record = OutputRecord::new(kind, json!({}));
        assert!(record.validate().is_ok(), "{} should be valid", kind);
    }
}

#[test]
fn test_validate_rejects_bad_model_kinds() {
    let empty = OutputRecord::new("", json!({}));
    assert_eq!(empty.validate(), Err(ValidationError::MissingModelKind));

    for kind in ["TestCase", "QA_TestCase", "qa_testCase", "qa_", "_TestCase", "qa_Test-Case"] {
        let record = OutputRecord::new(kind, json!({}));
        assert!(
            matches!(record.validate(), Err(ValidationError::InvalidModelKind(_))),
            "{} should be rejected",
            kind
        );
    }
}

#[test]
fn test_validate_rejects_non_object_payload() {
    let record = OutputRecord::new("qa_TestCase", json!([1]));
    assert_eq!(
        record.validate(),
        Err(ValidationError::PayloadNotObject("qa_TestCase".to_string()))
    );
}
