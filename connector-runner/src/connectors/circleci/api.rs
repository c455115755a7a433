use async_trait::async_trait;
use graphline::cursor::{CursorKind, CursorValue};
use graphline::fetch::{FetchError, Page, PageToken, Paginator, ReadFilter};
use graphline::record::RawRecord;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use tracing::debug;

use super::config::JobContext;
use crate::http::SourceClient;

/// One page of `GET /project/{slug}/{job_number}/tests`.
#[derive(Debug, Deserialize)]
pub struct TestsResponse {
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// HTTP client for the CircleCI v2 API.
///
/// Authenticates with the `Circle-Token` header.
pub struct CircleCiClient {
    client: SourceClient,
    token: String,
    base_url: String,
}

impl CircleCiClient {
    pub fn new(client: SourceClient, token: String, base_url: String) -> Self {
        Self {
            client,
            token,
            base_url,
        }
    }

    /// Fetch one page of test metadata for a job.
    pub async fn fetch_tests(
        &self,
        project_slug: &str,
        job_number: u64,
        page_token: Option<&str>,
    ) -> Result<TestsResponse, FetchError> {
        let url = format!("{}/project/{}/{}/tests", self.base_url, project_slug, job_number);
        let mut request = self
            .client
            .http()
            .get(&url)
            .header("Circle-Token", &self.token);
        if let Some(page_token) = page_token {
            request = request.query(&[("page-token", page_token)]);
        }
        self.client.send_json(request).await
    }
}

/// Pages through the tests of every configured job, in configuration order.
///
/// Continuation tokens have the form `{job_index}:{page_token}`; an empty
/// page token means the first page of that job.
pub struct TestsPaginator {
    client: CircleCiClient,
    jobs: Vec<JobContext>,
}

impl TestsPaginator {
    pub fn new(client: CircleCiClient, jobs: Vec<JobContext>) -> Self {
        Self { client, jobs }
    }

    /// Finished jobs that stopped at or after `since` are read; unfinished
    /// jobs never are. The boundary job is re-read, since a run that aborted
    /// partway through it has already advanced the watermark to its stop time.
    fn is_eligible(job: &JobContext, since: Option<&CursorValue>) -> bool {
        let Some(stopped_at) = job.job_stopped_at.as_deref() else {
            return false;
        };
        let Some(since) = since else {
            return true;
        };
        match CursorValue::from_json(&json!(stopped_at), CursorKind::Timestamp) {
            Some(stopped) => stopped.partial_cmp(since) != Some(Ordering::Less),
            None => true,
        }
    }

    fn next_eligible(&self, from: usize, since: Option<&CursorValue>) -> Option<usize> {
        (from..self.jobs.len()).find(|&i| Self::is_eligible(&self.jobs[i], since))
    }
}

#[async_trait]
impl Paginator for TestsPaginator {
    async fn fetch(&self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError> {
        let since = filter.since.as_ref();
        let (index, page_token) = match decode_token(token)? {
            (index, Some(page_token)) => (index, Some(page_token)),
            (from, None) => match self.next_eligible(from, since) {
                Some(index) => (index, None),
                None => return Ok(Page::last(Vec::new())),
            },
        };
        let job = self
            .jobs
            .get(index)
            .ok_or_else(|| FetchError::fatal(format!("continuation token names unknown job {}", index)))?;

        let response = self
            .client
            .fetch_tests(&job.project_slug, job.job_number, page_token.as_deref())
            .await?;

        debug!(
            project = %job.project_slug,
            job_number = job.job_number,
            tests = response.items.len(),
            "Fetched CircleCI tests page"
        );

        let items = response
            .items
            .into_iter()
            .map(|item| enrich(job, item))
            .collect();

        let next = match response.next_page_token {
            Some(page_token) if !page_token.is_empty() => Some(format!("{}:{}", index, page_token)),
            _ => self
                .next_eligible(index + 1, since)
                .map(|next_index| format!("{}:", next_index)),
        };

        Ok(Page { items, next })
    }
}

fn decode_token(token: &PageToken) -> Result<(usize, Option<String>), FetchError> {
    let raw = match token {
        PageToken::Start => return Ok((0, None)),
        PageToken::Next(raw) => raw,
    };
    let (index, page_token) = raw
        .split_once(':')
        .ok_or_else(|| FetchError::fatal(format!("malformed continuation token '{}'", raw)))?;
    let index = index
        .parse::<usize>()
        .map_err(|_| FetchError::fatal(format!("malformed continuation token '{}'", raw)))?;
    let page_token = (!page_token.is_empty()).then(|| page_token.to_string());
    Ok((index, page_token))
}

/// Copies the job's pipeline context onto a test item.
fn enrich(job: &JobContext, mut item: Map<String, Value>) -> RawRecord {
    item.insert("project_slug".to_string(), json!(job.project_slug));
    item.insert("pipeline_id".to_string(), json!(job.pipeline_id));
    item.insert("workflow_id".to_string(), json!(job.workflow_id));
    item.insert("workflow_name".to_string(), json!(job.workflow_name));
    item.insert("job_number".to_string(), json!(job.job_number));
    item.insert("job_started_at".to_string(), json!(job.job_started_at));
    item.insert("job_stopped_at".to_string(), json!(job.job_stopped_at));
    if let Some(revision) = &job.vcs_revision {
        item.insert("pipeline_vcs".to_string(), json!({ "revision": revision }));
    }
    RawRecord::from(item)
}
