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

use self::api::{CircleCiClient, TestsPaginator};
use self::config::CircleCiConfig;
use self::converter::TestsConverter;

pub const TESTS_STREAM: &str = "tests";

/// CircleCI connector: test metadata of finished jobs.
pub struct CircleCiConnector {
    config: CircleCiConfig,
    classifier: StatusClassifier,
    interval_secs: u64,
}

impl CircleCiConnector {
    pub fn new(config: CircleCiConfig, classifier: StatusClassifier, default_interval_secs: u64) -> Self {
        let classifier = match &config.transient_status_codes {
            Some(codes) => StatusClassifier::new(codes.iter().copied()),
            None => classifier,
        };
        let interval_secs = config.interval_secs.unwrap_or(default_interval_secs);
        Self {
            config,
            classifier,
            interval_secs,
        }
    }
}

impl Connector for CircleCiConnector {
    fn name(&self) -> &str {
        "circleci"
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        vec![StreamDescriptor::new(
            TESTS_STREAM,
            "job_stopped_at",
            CursorKind::Timestamp,
        )]
    }

    fn paginator(&self, stream: &str) -> Result<Arc<dyn Paginator>> {
        if stream != TESTS_STREAM {
            bail!("CircleCI has no stream '{}'", stream);
        }
        let client = SourceClient::new(
            self.classifier.clone(),
            Duration::from_secs(self.config.timeout_secs),
        )?;
        let client = CircleCiClient::new(
            client,
            self.config.token.clone(),
            self.config.base_url.clone(),
        );
        Ok(Arc::new(TestsPaginator::new(client, self.config.jobs.clone())))
    }

    fn converter(&self, stream: &str) -> Result<Box<dyn Converter>> {
        if stream != TESTS_STREAM {
            bail!("CircleCI has no stream '{}'", stream);
        }
        Ok(Box::new(TestsConverter::new()))
    }

    fn sync_interval(&self) -> u64 {
        self.interval_secs
    }
}
