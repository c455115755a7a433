use graphline::convert::{
    classify_status, join_uid, AggregateAccumulator, ConvertError, Converter, EntityDeduplicator,
};
use graphline::record::{entity_ref, OutputRecord, RawRecord};
use serde_json::{json, Map, Value};

use super::config::SOURCE;

const TEST_SUITE: &str = "qa_TestSuite";
const TEST_CASE: &str = "qa_TestCase";
const SUITE_CASE_ASSOCIATION: &str = "qa_TestSuiteTestCaseAssociation";
const TEST_CASE_RESULT: &str = "qa_TestCaseResult";
const TEST_EXECUTION: &str = "qa_TestExecution";
const EXECUTION_COMMIT_ASSOCIATION: &str = "qa_TestExecutionCommitAssociation";

const MAX_DESCRIPTION_CHARS: usize = 256;

/// Converts CircleCI test metadata into the QA model.
///
/// Suites, cases and their association are definitional and emitted once;
/// every record yields a `qa_TestCaseResult`; `qa_TestExecution` is an
/// aggregate per `(suite, job)` flushed at completion.
pub struct TestsConverter {
    emitted: EntityDeduplicator,
    executions: AggregateAccumulator,
}

impl TestsConverter {
    pub fn new() -> Self {
        Self {
            emitted: EntityDeduplicator::new(),
            executions: AggregateAccumulator::new(),
        }
    }
}

impl Default for TestsConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for TestsConverter {
    fn source(&self) -> &str {
        SOURCE
    }

    fn destination_models(&self) -> &[&'static str] {
        &[
            TEST_SUITE,
            SUITE_CASE_ASSOCIATION,
            TEST_CASE,
            TEST_EXECUTION,
            TEST_CASE_RESULT,
            EXECUTION_COMMIT_ASSOCIATION,
        ]
    }

    fn process_record(&mut self, record: &RawRecord) -> Result<Vec<OutputRecord>, ConvertError> {
        let pipeline_id = record.require_key_part("pipeline_id")?;
        let workflow_name = record.require_key_part("workflow_name")?;
        let classname = record.require_key_part("classname")?;
        let name = record.require_key_part("name")?;
        let job_number = record.require_key_part("job_number")?;

        let suite_uid = join_uid([&pipeline_id, &workflow_name, &classname]);
        let case_uid = join_uid([&suite_uid, &name]);
        let result_uid = join_uid([&case_uid, &job_number]);
        let execution_uid = join_uid([&suite_uid, &job_number]);
        let project = ProjectSlug::parse(record.get_str("project_slug"));

        let mut res = Vec::new();

        if self.emitted.should_emit(TEST_SUITE, &suite_uid) {
            res.push(OutputRecord::new(
                TEST_SUITE,
                json!({
                    "uid": suite_uid,
                    "name": workflow_name,
                    "source": SOURCE,
                    "type": {"category": "Custom", "detail": "unknown"},
                }),
            ));
        }

        if self.emitted.should_emit(TEST_CASE, &case_uid) {
            let display_name = match project.as_ref() {
                Some(project) => format!("{}: {}", project.repo, name),
                None => name.clone(),
            };
            let description = match record.get_str("file").filter(|f| !f.is_empty()) {
                Some(file) => format!("{}: {}", file, classname),
                None => classname.clone(),
            };
            res.push(OutputRecord::new(
                TEST_CASE,
                json!({
                    "uid": case_uid,
                    "name": display_name,
                    "description": description,
                    "source": SOURCE,
                    "type": {"category": "Custom", "detail": "unknown"},
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

        let status = classify_status(record.get_str("result"));
        let description = record
            .get_str("message")
            .map(|m| m.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>());
        res.push(OutputRecord::new(
            TEST_CASE_RESULT,
            json!({
                "uid": result_uid,
                "description": description,
                "status": status,
                "testCase": entity_ref(&case_uid, SOURCE),
                "testExecution": entity_ref(&execution_uid, SOURCE),
            }),
        ));

        let revision = record
            .get("pipeline_vcs")
            .and_then(|vcs| vcs.get("revision"))
            .and_then(Value::as_str);
        if let (Some(revision), Some(project)) = (revision, project.as_ref()) {
            if self
                .emitted
                .should_emit(EXECUTION_COMMIT_ASSOCIATION, &execution_uid)
            {
                res.push(OutputRecord::new(
                    EXECUTION_COMMIT_ASSOCIATION,
                    json!({
                        "testExecution": entity_ref(&execution_uid, SOURCE),
                        "commit": project.commit_key(revision),
                    }),
                ));
            }
        }

        self.executions.update(
            &execution_uid,
            || execution_fields(record, &workflow_name, &job_number, &suite_uid, project.as_ref()),
            status.category,
        );

        Ok(res)
    }

    fn on_complete(&mut self) -> Vec<OutputRecord> {
        self.executions
            .flush_all()
            .into_iter()
            .map(|execution| {
                let status = json!({ "category": execution.status(), "detail": null });
                let stats = json!(execution.counters());
                let mut payload = execution.fields;
                payload.insert("uid".to_string(), json!(execution.uid));
                payload.insert("status".to_string(), status);
                payload.insert("testCaseResultsStats".to_string(), stats);
                OutputRecord::new(TEST_EXECUTION, Value::Object(payload))
            })
            .collect()
    }
}

fn execution_fields(
    record: &RawRecord,
    workflow_name: &str,
    job_number: &str,
    suite_uid: &str,
    project: Option<&ProjectSlug>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(format!("{} - {}", workflow_name, job_number)));
    fields.insert("source".to_string(), json!(SOURCE));
    fields.insert("startedAt".to_string(), json!(record.get_str("job_started_at")));
    fields.insert("endedAt".to_string(), json!(record.get_str("job_stopped_at")));
    fields.insert("suite".to_string(), entity_ref(suite_uid, SOURCE));
    if let (Some(workflow_id), Some(project)) = (record.get_str("workflow_id"), project) {
        fields.insert("build".to_string(), project.build_key(workflow_id));
    }
    fields
}

/// `{vcs}/{org}/{repo}` as used in CircleCI project slugs.
#[derive(Debug, PartialEq)]
struct ProjectSlug {
    vcs: String,
    org: String,
    repo: String,
}

impl ProjectSlug {
    fn parse(slug: Option<&str>) -> Option<Self> {
        let mut parts = slug?.splitn(3, '/');
        let (vcs, org, repo) = (parts.next()?, parts.next()?, parts.next()?);
        if vcs.is_empty() || org.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self {
            vcs: vcs.to_string(),
            org: org.to_string(),
            repo: repo.to_string(),
        })
    }

    fn vcs_source(&self) -> &str {
        match self.vcs.to_lowercase().as_str() {
            "gh" | "github" => "GitHub",
            "bb" | "bitbucket" => "Bitbucket",
            "gl" | "gitlab" => "GitLab",
            _ => "VCS",
        }
    }

    fn commit_key(&self, sha: &str) -> Value {
        json!({
            "sha": sha,
            "repository": {
                "name": self.repo.to_lowercase(),
                "organization": {"uid": self.org.to_lowercase(), "source": self.vcs_source()},
            },
        })
    }

    fn build_key(&self, workflow_id: &str) -> Value {
        json!({
            "uid": workflow_id,
            "pipeline": {
                "uid": format!("{}/{}", self.org, self.repo).to_lowercase(),
                "organization": {"uid": self.org.to_lowercase(), "source": SOURCE},
            },
        })
    }
}
