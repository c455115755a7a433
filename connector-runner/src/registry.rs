//! Connector registry: builds every connector that has a config section.

use crate::config::RunnerConfig;
use crate::connectors::circleci::CircleCiConnector;
use crate::connectors::testrails::TestRailsConnector;
use crate::Connector;
use std::sync::Arc;

/// Returns the configured connectors.
pub fn build_connectors(config: &RunnerConfig) -> Vec<Arc<dyn Connector>> {
    let classifier = config.sync.retry.classifier();
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    if let Some(circleci) = &config.circleci {
        connectors.push(Arc::new(CircleCiConnector::new(
            circleci.clone(),
            classifier.clone(),
            config.interval_secs,
        )));
    }
    if let Some(testrails) = &config.testrails {
        connectors.push(Arc::new(TestRailsConnector::new(
            testrails.clone(),
            classifier.clone(),
            config.interval_secs,
            config.sync.reader.page_size,
        )));
    }

    connectors
}
