pub mod api;
pub mod config;
pub mod converter;

use crate::http::SourceClient;
use crate::Connector;
use anyhow::{bail, Result};
use graphline::convert::Converter;
use graphline::cursor::CursorKind;
use graphline::fetch::{Paginator, StatusClassifier};
use graphline::reader::StreamDescriptor;
use std::sync::Arc;
use std::time::Duration;

use self::api::{CasesPaginator, ResultsPaginator, TestRailsClient};
use self::config::{TestRailsConfig, MAX_PAGE_SIZE};
use self::converter::{CasesConverter, ResultsConverter};

pub const CASES_STREAM: &str = "cases";
pub const RESULTS_STREAM: &str = "results";

/// TestRails connector: test cases, incrementally by `updated_on` per suite,
/// and test results, incrementally by `created_on` per run.
pub struct TestRailsConnector {
    config: TestRailsConfig,
    classifier: StatusClassifier,
    interval_secs: u64,
    page_size: u32,
}

impl TestRailsConnector {
    pub fn new(
        config: TestRailsConfig,
        classifier: StatusClassifier,
        default_interval_secs: u64,
        page_size: u32,
    ) -> Self {
        let classifier = match &config.transient_status_codes {
            Some(codes) => StatusClassifier::new(codes.iter().copied()),
            None => classifier,
        };
        let interval_secs = config.interval_secs.unwrap_or(default_interval_secs);
        Self {
            config,
            classifier,
            interval_secs,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Connector for TestRailsConnector {
    fn name(&self) -> &str {
        "testrails"
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor::new(CASES_STREAM, "updated_on", CursorKind::Number)
                .partitioned_by("suite_id"),
            StreamDescriptor::new(RESULTS_STREAM, "created_on", CursorKind::Number)
                .partitioned_by("run_id"),
        ]
    }

    fn paginator(&self, stream: &str) -> Result<Arc<dyn Paginator>> {
        let client = || -> Result<TestRailsClient> {
            let client = SourceClient::new(
                self.classifier.clone(),
                Duration::from_secs(self.config.timeout_secs),
            )?;
            Ok(TestRailsClient::new(
                client,
                self.config.base_url().to_string(),
                self.config.username.clone(),
                self.config.api_key.clone(),
            ))
        };
        let project_id = self.config.project_id;
        let suite_ids = self.config.suite_ids.clone();
        match stream {
            CASES_STREAM => Ok(Arc::new(CasesPaginator::new(
                client()?,
                project_id,
                suite_ids,
                self.page_size,
            ))),
            RESULTS_STREAM => Ok(Arc::new(ResultsPaginator::new(
                client()?,
                project_id,
                suite_ids,
                self.page_size,
            ))),
            other => bail!("TestRails has no stream '{}'", other),
        }
    }

    fn converter(&self, stream: &str) -> Result<Box<dyn Converter>> {
        match stream {
            CASES_STREAM => Ok(Box::new(CasesConverter::new())),
            RESULTS_STREAM => Ok(Box::new(ResultsConverter::new())),
            other => bail!("TestRails has no stream '{}'", other),
        }
    }

    fn sync_interval(&self) -> u64 {
        self.interval_secs
    }
}
