use async_trait::async_trait;
use graphline::cursor::CursorValue;
use graphline::fetch::{FetchError, Page, PageToken, Paginator, ReadFilter};
use graphline::record::RawRecord;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::http::SourceClient;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Suite {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseType {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Milestone {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Run {
    pub id: u64,
    #[serde(default)]
    pub suite_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result status; `name` is the system name (`passed`, `retest`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ResultStatus {
    pub id: u64,
    pub name: String,
}

/// A test is a case instantiated in one run.
#[derive(Debug, Clone, Deserialize)]
pub struct Test {
    pub id: u64,
    pub case_id: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of a paginated listing.
#[derive(Debug)]
pub struct ListingPage<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

/// HTTP client for the TestRails v2 API (basic auth with an API key).
pub struct TestRailsClient {
    client: SourceClient,
    base_url: String,
    username: String,
    api_key: String,
}

impl TestRailsClient {
    pub fn new(client: SourceClient, base_url: String, username: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            username,
            api_key,
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/index.php?/api/v2/{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str) -> Result<Value, FetchError> {
        let request = self
            .client
            .http()
            .get(self.api_url(endpoint))
            .basic_auth(&self.username, Some(&self.api_key))
            .header("Content-Type", "application/json");
        self.client.send_json(request).await
    }

    pub async fn fetch_suites(&self, project_id: u64) -> Result<Vec<Suite>, FetchError> {
        let value = self.get(&format!("get_suites/{}", project_id)).await?;
        listing(value, "suites")
    }

    pub async fn fetch_case_types(&self) -> Result<Vec<CaseType>, FetchError> {
        let value = self.get("get_case_types").await?;
        listing(value, "case_types")
    }

    /// First page of milestones only; projects rarely carry more than 250.
    pub async fn fetch_milestones(&self, project_id: u64) -> Result<Vec<Milestone>, FetchError> {
        let value = self.get(&format!("get_milestones/{}", project_id)).await?;
        listing(value, "milestones")
    }

    /// Fetch one page of cases of a suite, optionally only those updated
    /// after `updated_after` (epoch seconds).
    pub async fn fetch_cases(
        &self,
        project_id: u64,
        suite_id: u64,
        offset: u64,
        limit: u32,
        updated_after: Option<i64>,
    ) -> Result<ListingPage<Map<String, Value>>, FetchError> {
        let mut endpoint = format!(
            "get_cases/{}&suite_id={}&limit={}&offset={}",
            project_id, suite_id, limit, offset
        );
        if let Some(updated_after) = updated_after {
            endpoint.push_str(&format!("&updated_after={}", updated_after));
        }
        paged(self.get(&endpoint).await?, "cases")
    }

    /// Every run of the project, following `_links.next`.
    pub async fn fetch_runs(&self, project_id: u64, limit: u32) -> Result<Vec<Run>, FetchError> {
        let mut runs = Vec::new();
        loop {
            let endpoint = format!("get_runs/{}&limit={}&offset={}", project_id, limit, runs.len());
            let page: ListingPage<Run> = paged(self.get(&endpoint).await?, "runs")?;
            let done = !page.has_next || page.items.is_empty();
            runs.extend(page.items);
            if done {
                return Ok(runs);
            }
        }
    }

    pub async fn fetch_statuses(&self) -> Result<Vec<ResultStatus>, FetchError> {
        let value = self.get("get_statuses").await?;
        listing(value, "statuses")
    }

    /// Every test of a run, following `_links.next`.
    pub async fn fetch_tests(&self, run_id: u64, limit: u32) -> Result<Vec<Test>, FetchError> {
        let mut tests = Vec::new();
        loop {
            let endpoint = format!("get_tests/{}&limit={}&offset={}", run_id, limit, tests.len());
            let page: ListingPage<Test> = paged(self.get(&endpoint).await?, "tests")?;
            let done = !page.has_next || page.items.is_empty();
            tests.extend(page.items);
            if done {
                return Ok(tests);
            }
        }
    }

    /// Fetch one page of results of a run, optionally only those created
    /// after `created_after` (epoch seconds).
    pub async fn fetch_results(
        &self,
        run_id: u64,
        offset: u64,
        limit: u32,
        created_after: Option<i64>,
    ) -> Result<ListingPage<Map<String, Value>>, FetchError> {
        let mut endpoint = format!("get_results_for_run/{}&limit={}&offset={}", run_id, limit, offset);
        if let Some(created_after) = created_after {
            endpoint.push_str(&format!("&created_after={}", created_after));
        }
        paged(self.get(&endpoint).await?, "results")
    }
}

fn paged<T: DeserializeOwned>(value: Value, key: &str) -> Result<ListingPage<T>, FetchError> {
    // TestRails before 6.7 returns a bare array without pagination.
    let has_next = value
        .get("_links")
        .and_then(|links| serde_json::from_value::<Links>(links.clone()).ok())
        .and_then(|links| links.next)
        .is_some();
    let items = listing(value, key)?;
    Ok(ListingPage { items, has_next })
}

/// Accepts both a bare array and the paginated `{ "<key>": [...] }` shape.
fn listing<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, FetchError> {
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Array(Vec::new())),
        other => {
            return Err(FetchError::fatal(format!(
                "expected a list of {}, got {}",
                key, other
            )))
        }
    };
    serde_json::from_value(items)
        .map_err(|e| FetchError::fatal(format!("malformed {} listing: {}", key, e)))
}

/// Lookup tables resolved once per paginator.
#[derive(Debug, Default)]
pub struct Catalog {
    pub suites: Vec<Suite>,
    pub case_types: HashMap<u64, String>,
    pub milestones: HashMap<u64, String>,
}

/// Pages through the cases of every suite, suite by suite.
///
/// Tokens have the form `{suite_index}:{offset}`. Each suite is one cursor
/// partition, so `updated_after` comes from that suite's own watermark.
pub struct CasesPaginator {
    client: TestRailsClient,
    project_id: u64,
    suite_ids: Vec<u64>,
    page_size: u32,
    catalog: OnceCell<Catalog>,
}

impl CasesPaginator {
    pub fn new(client: TestRailsClient, project_id: u64, suite_ids: Vec<u64>, page_size: u32) -> Self {
        Self {
            client,
            project_id,
            suite_ids,
            page_size: page_size.max(1),
            catalog: OnceCell::new(),
        }
    }

    async fn catalog(&self) -> Result<&Catalog, FetchError> {
        self.catalog.get_or_try_init(|| self.load_catalog()).await
    }

    async fn load_catalog(&self) -> Result<Catalog, FetchError> {
        let mut suites = self.client.fetch_suites(self.project_id).await?;
        if !self.suite_ids.is_empty() {
            suites.retain(|suite| self.suite_ids.contains(&suite.id));
        }
        suites.sort_by_key(|suite| suite.id);

        let case_types = self
            .client
            .fetch_case_types()
            .await?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();
        let milestones = self
            .client
            .fetch_milestones(self.project_id)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        info!(
            project_id = self.project_id,
            suites = suites.len(),
            "Loaded TestRails catalog"
        );

        Ok(Catalog {
            suites,
            case_types,
            milestones,
        })
    }
}

#[async_trait]
impl Paginator for CasesPaginator {
    async fn fetch(&self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError> {
        let catalog = self.catalog().await?;
        let (index, offset) = decode_token(token)?;
        let Some(suite) = catalog.suites.get(index) else {
            return Ok(Page::last(Vec::new()));
        };

        let updated_after = filter
            .since_for(&suite.id.to_string())
            .and_then(epoch_seconds);
        let response = self
            .client
            .fetch_cases(self.project_id, suite.id, offset, self.page_size, updated_after)
            .await?;

        let count = response.items.len() as u64;
        debug!(
            suite_id = suite.id,
            offset = offset,
            cases = count,
            "Fetched TestRails cases page"
        );

        let next = if response.has_next && count > 0 {
            Some(format!("{}:{}", index, offset + count))
        } else if index + 1 < catalog.suites.len() {
            Some(format!("{}:0", index + 1))
        } else {
            None
        };

        let items = response
            .items
            .into_iter()
            .map(|case| enrich(case, suite, catalog))
            .collect();

        Ok(Page { items, next })
    }
}

/// Runs and statuses resolved once per results paginator.
#[derive(Debug, Default)]
pub struct RunCatalog {
    pub runs: Vec<Run>,
    pub statuses: HashMap<u64, String>,
}

/// Reads the results of every run, one run per page.
///
/// Tokens are run indexes. Each run is one cursor partition keyed by
/// `run_id`, so `created_after` comes from that run's own watermark. A page
/// holds all of a run's new results in ascending `created_on` order, so a
/// run is never left half-read by a failed fetch.
pub struct ResultsPaginator {
    client: TestRailsClient,
    project_id: u64,
    suite_ids: Vec<u64>,
    page_size: u32,
    catalog: OnceCell<RunCatalog>,
}

impl ResultsPaginator {
    pub fn new(client: TestRailsClient, project_id: u64, suite_ids: Vec<u64>, page_size: u32) -> Self {
        Self {
            client,
            project_id,
            suite_ids,
            page_size: page_size.max(1),
            catalog: OnceCell::new(),
        }
    }

    async fn catalog(&self) -> Result<&RunCatalog, FetchError> {
        self.catalog.get_or_try_init(|| self.load_catalog()).await
    }

    async fn load_catalog(&self) -> Result<RunCatalog, FetchError> {
        let mut runs = self.client.fetch_runs(self.project_id, self.page_size).await?;
        if !self.suite_ids.is_empty() {
            runs.retain(|run| run.suite_id.is_some_and(|id| self.suite_ids.contains(&id)));
        }
        runs.sort_by_key(|run| run.id);

        let statuses = self
            .client
            .fetch_statuses()
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        info!(project_id = self.project_id, runs = runs.len(), "Loaded TestRails runs");
        Ok(RunCatalog { runs, statuses })
    }

    async fn run_results(&self, run: &Run, created_after: Option<i64>) -> Result<Vec<Map<String, Value>>, FetchError> {
        let mut results = Vec::new();
        loop {
            let page = self
                .client
                .fetch_results(run.id, results.len() as u64, self.page_size, created_after)
                .await?;
            let done = !page.has_next || page.items.is_empty();
            results.extend(page.items);
            if done {
                return Ok(results);
            }
        }
    }
}

#[async_trait]
impl Paginator for ResultsPaginator {
    async fn fetch(&self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError> {
        let catalog = self.catalog().await?;
        let index = match token {
            PageToken::Start => 0,
            PageToken::Next(raw) => raw
                .parse::<usize>()
                .map_err(|_| FetchError::fatal(format!("malformed continuation token '{}'", raw)))?,
        };
        let Some(run) = catalog.runs.get(index) else {
            return Ok(Page::last(Vec::new()));
        };

        let created_after = filter
            .since_for(&run.id.to_string())
            .and_then(epoch_seconds);
        let mut results = self.run_results(run, created_after).await?;

        let cases = if results.is_empty() {
            HashMap::new()
        } else {
            self.client
                .fetch_tests(run.id, self.page_size)
                .await?
                .into_iter()
                .map(|t| (t.id, t.case_id))
                .collect()
        };
        debug!(run_id = run.id, results = results.len(), "Fetched TestRails run results");

        results.sort_by_key(|result| result.get("created_on").and_then(Value::as_i64).unwrap_or(0));
        let items = results
            .into_iter()
            .map(|result| enrich_result(result, run, &cases, &catalog.statuses))
            .collect();

        let next = (index + 1 < catalog.runs.len()).then(|| (index + 1).to_string());
        Ok(Page { items, next })
    }
}

/// Resolves the run, case and status name onto a result.
fn enrich_result(
    mut result: Map<String, Value>,
    run: &Run,
    cases: &HashMap<u64, u64>,
    statuses: &HashMap<u64, String>,
) -> RawRecord {
    let case_id = result
        .get("test_id")
        .and_then(Value::as_u64)
        .and_then(|id| cases.get(&id));
    let status = result
        .get("status_id")
        .and_then(Value::as_u64)
        .and_then(|id| statuses.get(&id));

    result.insert("case_id".to_string(), json!(case_id));
    result.insert("status".to_string(), json!(status));
    result.insert("run_id".to_string(), json!(run.id));
    result.insert("run_name".to_string(), json!(run.name));
    result.insert("suite_id".to_string(), json!(run.suite_id));
    RawRecord::from(result)
}

fn decode_token(token: &PageToken) -> Result<(usize, u64), FetchError> {
    let raw = match token {
        PageToken::Start => return Ok((0, 0)),
        PageToken::Next(raw) => raw,
    };
    let malformed = || FetchError::fatal(format!("malformed continuation token '{}'", raw));
    let (index, offset) = raw.split_once(':').ok_or_else(malformed)?;
    Ok((
        index.parse().map_err(|_| malformed())?,
        offset.parse().map_err(|_| malformed())?,
    ))
}

fn epoch_seconds(value: &CursorValue) -> Option<i64> {
    match value {
        CursorValue::Integer(i) => Some(*i),
        CursorValue::Float(f) if f.is_finite() => Some(f.floor() as i64),
        CursorValue::Float(_) => None,
        CursorValue::Timestamp(t) => Some(t.timestamp()),
    }
}

/// Resolves suite, type and milestone names onto a case.
fn enrich(mut case: Map<String, Value>, suite: &Suite, catalog: &Catalog) -> RawRecord {
    let lookup = |field: &str, table: &HashMap<u64, String>| {
        case.get(field)
            .and_then(Value::as_u64)
            .and_then(|id| table.get(&id))
            .cloned()
    };
    let case_type = lookup("type_id", &catalog.case_types);
    let milestone = lookup("milestone_id", &catalog.milestones);

    case.entry("suite_id").or_insert_with(|| json!(suite.id));
    case.insert("suite_name".to_string(), json!(suite.name));
    case.insert("type".to_string(), json!(case_type));
    case.insert("milestone".to_string(), json!(milestone));
    RawRecord::from(case)
}
