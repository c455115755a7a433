//! Per-stream sync scheduler.
//!
//! Each connector stream gets its own scheduler that runs on an interval,
//! reads from the last checkpoint, writes to the destination sink and
//! commits the new checkpoint.

use crate::Connector;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use graphline::config::SyncConfig;
use graphline::{
    CheckpointStore, RecordSink, RetryingFetcher, RunFailure, RunSummary, StreamDescriptor,
    StreamReader, StreamState, SyncRun,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-stream sync scheduler.
///
/// Manages the sync lifecycle for one stream of one connector:
/// - Runs on a fixed interval
/// - Resumes from the stream's checkpoint
/// - Commits state after success, and after resumable failures
/// - Tracks status (last sync, errors, last committed state)
pub struct SyncScheduler {
    connector: Arc<dyn Connector>,
    descriptor: StreamDescriptor,
    settings: SyncConfig,
    store: CheckpointStore,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
    status: Arc<tokio::sync::Mutex<SyncStatus>>,
}

/// Status information for a connector stream.
#[derive(Clone, Debug, Default)]
pub struct SyncStatus {
    /// Last successful sync timestamp
    pub last_sync: Option<DateTime<Utc>>,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Total number of successful syncs
    pub sync_count: u64,
    /// Total number of failed syncs
    pub error_count: u64,
    /// State committed by the last run
    pub last_state: Option<StreamState>,
    pub last_run_id: Option<Uuid>,
}

impl SyncScheduler {
    pub fn new(
        connector: Arc<dyn Connector>,
        descriptor: StreamDescriptor,
        settings: SyncConfig,
        store: CheckpointStore,
        sink: Arc<dyn RecordSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            descriptor,
            settings,
            store,
            sink,
            cancel,
            status: Arc::new(tokio::sync::Mutex::new(SyncStatus::default())),
        }
    }

    /// Returns a clone of the status tracker for external monitoring.
    pub fn status(&self) -> Arc<tokio::sync::Mutex<SyncStatus>> {
        Arc::clone(&self.status)
    }

    /// Key of this stream in the checkpoint file.
    pub fn state_key(&self) -> String {
        format!("{}:{}", self.connector.name(), self.descriptor.name)
    }

    /// Starts the sync loop (non-blocking).
    ///
    /// The first run starts immediately. The loop exits when the
    /// cancellation token fires; an in-flight run observes the same token.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.connector.sync_interval().max(1);
        let key = self.state_key();

        tokio::spawn(async move {
            info!(stream = %key, interval_secs = interval_secs, "Starting sync scheduler");

            let mut interval = interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!(stream = %key, "Sync scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        debug!(stream = %key, "Sync tick");
                        // Failures are recorded in the status; the next tick retries.
                        let _ = self.sync().await;
                    }
                }
            }
        })
    }

    /// Runs one sync and records the outcome in the status tracker.
    pub async fn sync(&self) -> Result<RunSummary> {
        let key = self.state_key();
        let result = self.run_once().await;

        let mut status = self.status.lock().await;
        match &result {
            Ok(summary) => {
                status.last_sync = Some(Utc::now());
                status.last_error = None;
                status.sync_count += 1;
                status.last_state = Some(summary.state.clone());
                status.last_run_id = Some(summary.run_id);
            }
            Err(e) => {
                error!(stream = %key, error = %e, "Sync failed");
                status.last_error = Some(format!("{:#}", e));
                status.error_count += 1;
                if let Some(failure) = e.downcast_ref::<RunFailure>() {
                    status.last_run_id = Some(failure.run_id);
                }
            }
        }

        result
    }

    /// Loads the checkpoint, runs the stream once and commits the result.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let key = self.state_key();
        let stream = self.descriptor.name.as_str();

        let previous = self
            .store
            .load()
            .context("Failed to load checkpoint")?
            .stream(&key);

        let paginator = self
            .connector
            .paginator(stream)
            .with_context(|| format!("Failed to create paginator for {}", key))?;
        let converter = self
            .connector
            .converter(stream)
            .with_context(|| format!("Failed to create converter for {}", key))?;

        let fetcher = RetryingFetcher::new(
            paginator,
            self.settings.retry.retry_config(),
            self.cancel.child_token(),
        );
        let reader = StreamReader::new(
            self.descriptor.clone(),
            self.settings.reader.mode,
            previous,
            fetcher,
        )
        .with_start_cutoff_days(self.settings.reader.start_cutoff_days);
        let run = SyncRun::new(reader, converter)
            .with_skip_malformed(self.settings.converter.skip_malformed);

        match run.execute(self.sink.as_ref()).await {
            Ok(summary) => {
                let committed = self
                    .store
                    .commit(&key, &summary.state)
                    .context("Failed to commit checkpoint")?;
                Ok(RunSummary {
                    state: committed,
                    ..summary
                })
            }
            Err(failure) => {
                if self.settings.checkpoint.persist_on_failure && failure.error.is_resumable() {
                    if let Err(e) = self.store.commit(&key, &failure.state) {
                        warn!(stream = %key, error = %e, "Failed to commit partial progress");
                    }
                } else {
                    info!(
                        stream = %key,
                        run_id = %failure.run_id,
                        "Discarding progress of failed run"
                    );
                }
                Err(failure.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use graphline::convert::Converter;
    use graphline::fetch::{FetchError, MemoryPaginator, Paginator};
    use graphline::{CursorKind, CursorValue, RawRecord, RunError, VecSink};
    use serde_json::json;
    use std::sync::Mutex;

    use crate::connectors::circleci::converter::TestsConverter;

    /// Serves fixed pages through a fresh `MemoryPaginator` per run.
    struct MemoryConnector {
        pages: Mutex<Vec<Vec<RawRecord>>>,
        failure: Option<(usize, FetchError)>,
    }

    impl MemoryConnector {
        fn new(pages: Vec<Vec<RawRecord>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                failure: None,
            }
        }

        fn failing_at(mut self, page: usize, error: FetchError) -> Self {
            self.failure = Some((page, error));
            self
        }

        fn replace_pages(&self, pages: Vec<Vec<RawRecord>>) {
            *self.pages.lock().unwrap() = pages;
        }
    }

    impl Connector for MemoryConnector {
        fn name(&self) -> &str {
            "memory"
        }

        fn streams(&self) -> Vec<StreamDescriptor> {
            vec![StreamDescriptor::new("tests", "job_stopped_at", CursorKind::Timestamp)]
        }

        fn paginator(&self, stream: &str) -> Result<Arc<dyn Paginator>> {
            if stream != "tests" {
                bail!("unknown stream {}", stream);
            }
            let pages = self.pages.lock().unwrap().clone();
            let mut paginator = MemoryPaginator::new(pages, CursorKind::Timestamp);
            if let Some((page, error)) = &self.failure {
                paginator = paginator.fail_page(*page, vec![error.clone()]);
            }
            Ok(Arc::new(paginator))
        }

        fn converter(&self, _stream: &str) -> Result<Box<dyn Converter>> {
            Ok(Box::new(TestsConverter::new()))
        }

        fn sync_interval(&self) -> u64 {
            1
        }
    }

    fn test_record(name: &str, job_number: u64, stopped_at: &str) -> RawRecord {
        RawRecord::from_value(json!({
            "project_slug": "gh/acme/api",
            "pipeline_id": "p1",
            "workflow_id": "w1",
            "workflow_name": "build",
            "job_number": job_number,
            "job_stopped_at": stopped_at,
            "classname": "LoginTest",
            "name": name,
            "result": "success",
        }))
        .unwrap()
    }

    fn settings() -> SyncConfig {
        let mut settings = SyncConfig::default();
        settings.retry.max_retries = 0;
        settings
    }

    fn scheduler(
        connector: Arc<MemoryConnector>,
        store: CheckpointStore,
        sink: Arc<VecSink>,
        settings: SyncConfig,
    ) -> SyncScheduler {
        let descriptor = connector.streams().remove(0);
        SyncScheduler::new(
            connector,
            descriptor,
            settings,
            store,
            sink,
            CancellationToken::new(),
        )
    }

    fn watermark(state: &StreamState) -> Option<CursorValue> {
        state.watermark("job_stopped_at").cloned()
    }

    #[tokio::test]
    async fn test_sync_commits_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        let sink = Arc::new(VecSink::new());
        let connector = Arc::new(MemoryConnector::new(vec![vec![
            test_record("a", 1, "2026-03-01T10:00:00Z"),
            test_record("b", 2, "2026-03-02T10:00:00Z"),
        ]]));

        let scheduler = scheduler(connector, store.clone(), Arc::clone(&sink), settings());
        assert_eq!(scheduler.state_key(), "memory:tests");

        let summary = scheduler.sync().await.unwrap();
        assert_eq!(summary.records_read, 2);

        let stored = store.load().unwrap().stream("memory:tests");
        assert_eq!(watermark(&stored), watermark(&summary.state));
        assert_eq!(
            watermark(&stored).map(|v| v.to_string()),
            Some("2026-03-02T10:00:00+00:00".to_string())
        );

        let status = scheduler.status();
        let status = status.lock().await;
        assert_eq!(status.sync_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_run_id, Some(summary.run_id));
        assert_eq!(sink.of_kind("qa_TestExecution").len(), 2);
    }

    #[tokio::test]
    async fn test_second_sync_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json.gz"));
        let sink = Arc::new(VecSink::new());
        let connector = Arc::new(MemoryConnector::new(vec![vec![test_record(
            "a",
            1,
            "2026-03-01T10:00:00Z",
        )]]));

        let scheduler = scheduler(Arc::clone(&connector), store, Arc::clone(&sink), settings());
        scheduler.sync().await.unwrap();

        connector.replace_pages(vec![vec![
            test_record("a", 1, "2026-03-01T10:00:00Z"),
            test_record("b", 2, "2026-03-03T10:00:00Z"),
        ]]);
        let second = scheduler.sync().await.unwrap();

        assert_eq!(second.records_read, 1);
        assert_eq!(sink.of_kind("qa_TestCaseResult").len(), 2);
    }

    #[tokio::test]
    async fn test_resumable_failure_commits_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        let sink = Arc::new(VecSink::new());
        let connector = Arc::new(
            MemoryConnector::new(vec![
                vec![test_record("a", 1, "2026-03-01T10:00:00Z")],
                vec![test_record("b", 2, "2026-03-02T10:00:00Z")],
            ])
            .failing_at(1, FetchError::fatal("401 Unauthorized")),
        );

        let scheduler = scheduler(connector, store.clone(), sink, settings());
        let err = scheduler.sync().await.unwrap_err();

        let failure = err.downcast_ref::<RunFailure>().unwrap();
        assert!(matches!(failure.error, RunError::Fetch(_)));
        let stored = store.load().unwrap().stream("memory:tests");
        assert_eq!(
            watermark(&stored).map(|v| v.to_string()),
            Some("2026-03-01T10:00:00+00:00".to_string())
        );

        let status = scheduler.status();
        let status = status.lock().await;
        assert_eq!(status.error_count, 1);
        assert!(status.last_error.as_deref().unwrap().contains("401"));
        assert_eq!(status.last_run_id, Some(failure.run_id));
    }

    #[tokio::test]
    async fn test_failure_discards_progress_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        let connector = Arc::new(
            MemoryConnector::new(vec![
                vec![test_record("a", 1, "2026-03-01T10:00:00Z")],
                vec![test_record("b", 2, "2026-03-02T10:00:00Z")],
            ])
            .failing_at(1, FetchError::fatal("boom")),
        );
        let mut settings = settings();
        settings.checkpoint.persist_on_failure = false;

        let scheduler = scheduler(connector, store.clone(), Arc::new(VecSink::new()), settings);
        assert!(scheduler.sync().await.is_err());
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        let connector = Arc::new(MemoryConnector::new(vec![vec![test_record(
            "a",
            1,
            "2026-03-01T10:00:00Z",
        )]]));

        let scheduler = scheduler(connector, store, Arc::new(VecSink::new()), settings());
        let cancel = scheduler.cancel.clone();
        let status = scheduler.status();
        let handle = scheduler.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if status.lock().await.sync_count > 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
