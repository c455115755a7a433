use chrono::{TimeZone, Utc};
use graphline::convert::{classify_status, ConvertError, Converter, EntityDeduplicator};
use graphline::record::{entity_ref, OutputRecord, RawRecord};
use serde_json::{json, Value};

use super::config::SOURCE;

const TEST_SUITE: &str = "qa_TestSuite";
const TEST_CASE: &str = "qa_TestCase";
const SUITE_CASE_ASSOCIATION: &str = "qa_TestSuiteTestCaseAssociation";
const TEST_CASE_RESULT: &str = "qa_TestCaseResult";

const MAX_DESCRIPTION_CHARS: usize = 256;

/// TestRails case type name to test case category.
const CASE_TYPES: &[(&str, &str)] = &[
    ("functional", "Functional"),
    ("performance", "Performance"),
    ("regression", "Regression"),
    ("security", "Security"),
    ("smoke & sanity", "Smoke"),
    ("smoke", "Smoke"),
];

/// Converts TestRails cases into suites, cases and their associations.
///
/// Cases carry no outcomes, so nothing is aggregated.
pub struct CasesConverter {
    emitted: EntityDeduplicator,
}

impl CasesConverter {
    pub fn new() -> Self {
        Self {
            emitted: EntityDeduplicator::new(),
        }
    }
}

impl Default for CasesConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for CasesConverter {
    fn source(&self) -> &str {
        SOURCE
    }

    fn destination_models(&self) -> &[&'static str] {
        &[TEST_SUITE, TEST_CASE, SUITE_CASE_ASSOCIATION]
    }

    fn process_record(&mut self, record: &RawRecord) -> Result<Vec<OutputRecord>, ConvertError> {
        let case_uid = record.require_key_part("id")?;
        let suite_uid = record.require_key_part("suite_id")?;
        let mut res = Vec::new();

        if self.emitted.should_emit(TEST_SUITE, &suite_uid) {
            let name = record.get_str("suite_name").unwrap_or(&suite_uid);
            res.push(OutputRecord::new(
                TEST_SUITE,
                json!({
                    "uid": suite_uid,
                    "name": name,
                    "source": SOURCE,
                    "type": {"category": "Custom", "detail": "unknown"},
                }),
            ));
        }

        if self.emitted.should_emit(TEST_CASE, &case_uid) {
            let tags: Vec<String> = record
                .get_str("milestone")
                .map(|milestone| format!("milestone:{}", milestone))
                .into_iter()
                .collect();
            res.push(OutputRecord::new(
                TEST_CASE,
                json!({
                    "uid": case_uid,
                    "name": record.get_str("title"),
                    "source": SOURCE,
                    "tags": tags,
                    "type": case_type(record.get_str("type")),
                }),
            ));
            res.push(OutputRecord::new(
                SUITE_CASE_ASSOCIATION,
                json!({
                    "testSuite": entity_ref(&suite_uid, SOURCE),
                    "testCase": entity_ref(&case_uid, SOURCE),
                }),
            ));
        }

        Ok(res)
    }

    fn on_complete(&mut self) -> Vec<OutputRecord> {
        Vec::new()
    }
}

/// Converts TestRails results into one `qa_TestCaseResult` each.
///
/// The result references its case by the case id, the same uid the cases
/// stream emits.
#[derive(Debug, Default)]
pub struct ResultsConverter;

impl ResultsConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for ResultsConverter {
    fn source(&self) -> &str {
        SOURCE
    }

    fn destination_models(&self) -> &[&'static str] {
        &[TEST_CASE_RESULT]
    }

    fn process_record(&mut self, record: &RawRecord) -> Result<Vec<OutputRecord>, ConvertError> {
        let result_uid = record.require_key_part("id")?;
        let case_uid = record.require_key_part("case_id")?;

        let description = record
            .get_str("comment")
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>());
        let ended_at = record
            .get("created_on")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|t| t.to_rfc3339());

        Ok(vec![OutputRecord::new(
            TEST_CASE_RESULT,
            json!({
                "uid": result_uid,
                "description": description,
                "endedAt": ended_at,
                "status": classify_status(record.get_str("status")),
                "testCase": entity_ref(&case_uid, SOURCE),
            }),
        )])
    }

    fn on_complete(&mut self) -> Vec<OutputRecord> {
        Vec::new()
    }
}

fn case_type(name: Option<&str>) -> Value {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return json!({"category": "Custom", "detail": "unknown"});
    };
    let lowered = name.to_lowercase();
    let category = CASE_TYPES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, category)| *category)
        .unwrap_or("Custom");
    json!({"category": category, "detail": name})
}
