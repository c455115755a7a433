// Integration tests for resuming incremental syncs from a checkpoint file.
//
// Each run builds a fresh reader from the stored state, the way the runner
// does on every tick.

use graphline::convert::{ConvertError, Converter};
use graphline::fetch::{BackoffPolicy, MemoryPaginator, RetryConfig};
use graphline::{
    CheckpointStore, CursorKind, CursorValue, FetchError, OutputRecord, RawRecord, RetryingFetcher,
    RunError, StreamDescriptor, StreamReader, SyncMode, SyncRun, VecSink,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ── Fixtures ──────────────────────────────────────────────────────────────────

struct CaseConverter;

impl Converter for CaseConverter {
    fn source(&self) -> &str {
        "Memory"
    }

    fn destination_models(&self) -> &[&'static str] {
        &["qa_TestCase"]
    }

    fn process_record(&mut self, record: &RawRecord) -> Result<Vec<OutputRecord>, ConvertError> {
        let uid = record.require_key_part("id")?;
        Ok(vec![OutputRecord::new(
            "qa_TestCase",
            json!({ "uid": uid, "source": "Memory" }),
        )])
    }

    fn on_complete(&mut self) -> Vec<OutputRecord> {
        Vec::new()
    }
}

fn case(id: u64, suite: u64, updated_on: i64) -> RawRecord {
    RawRecord::from_value(json!({ "id": id, "suite_id": suite, "updated_on": updated_on })).unwrap()
}

fn descriptor() -> StreamDescriptor {
    StreamDescriptor::new("cases", "updated_on", CursorKind::Number).partitioned_by("suite_id")
}

async fn run(
    store: &CheckpointStore,
    paginator: MemoryPaginator,
    mode: SyncMode,
    sink: &VecSink,
) -> Result<u64, RunError> {
    let previous = store.load().unwrap().stream("memory:cases");
    let fetcher = RetryingFetcher::new(
        Arc::new(paginator),
        RetryConfig {
            max_retries: 0,
            backoff: BackoffPolicy::Fixed {
                delay: Duration::from_millis(1),
            },
        },
        CancellationToken::new(),
    );
    let reader = StreamReader::new(descriptor(), mode, previous, fetcher);
    match SyncRun::new(reader, Box::new(CaseConverter)).execute(sink).await {
        Ok(summary) => {
            store.commit("memory:cases", &summary.state).unwrap();
            Ok(summary.records_read)
        }
        Err(failure) => {
            if failure.error.is_resumable() {
                store.commit("memory:cases", &failure.state).unwrap();
            }
            Err(failure.error)
        }
    }
}

fn pages() -> Vec<Vec<RawRecord>> {
    vec![
        vec![case(1, 10, 100), case(2, 10, 200)],
        vec![case(3, 11, 150), case(4, 10, 300)],
    ]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_run_resumes_after_last_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.json.gz"));

    let sink = VecSink::new();
    let failing = MemoryPaginator::new(pages(), CursorKind::Number)
        .fail_page(1, vec![FetchError::fatal("401 Unauthorized")]);
    let err = run(&store, failing, SyncMode::Incremental, &sink).await.unwrap_err();
    assert!(matches!(err, RunError::Fetch(_)));
    assert_eq!(sink.records().len(), 2);

    let stored = store.load().unwrap().stream("memory:cases");
    assert_eq!(stored.watermark("updated_on"), Some(&CursorValue::Integer(200)));

    let sink = VecSink::new();
    let read = run(
        &store,
        MemoryPaginator::new(pages(), CursorKind::Number),
        SyncMode::Incremental,
        &sink,
    )
    .await
    .unwrap();
    // Suite 11 was never reached, so its older case is still read.
    assert_eq!(read, 2);
    let uids: Vec<_> = sink.records().iter().map(|r| r.payload["uid"].clone()).collect();
    assert_eq!(uids, vec![json!("3"), json!("4")]);

    let stored = store.load().unwrap().stream("memory:cases");
    assert_eq!(stored.watermark("updated_on"), Some(&CursorValue::Integer(300)));
    assert_eq!(stored.partitions.get("10"), Some(&CursorValue::Integer(300)));
    assert_eq!(stored.partitions.get("11"), Some(&CursorValue::Integer(150)));
}

#[tokio::test]
async fn test_unseen_partition_has_no_lower_bound_after_abort() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.json"));
    let pages = || vec![vec![case(1, 10, 500)], vec![case(2, 20, 100)]];

    let failing = MemoryPaginator::new(pages(), CursorKind::Number)
        .fail_page(1, vec![FetchError::fatal("401 Unauthorized")]);
    run(&store, failing, SyncMode::Incremental, &VecSink::new())
        .await
        .unwrap_err();

    let stored = store.load().unwrap().stream("memory:cases");
    assert_eq!(stored.partitions.get("10"), Some(&CursorValue::Integer(500)));
    assert!(stored.partitions.get("20").is_none());

    let fetcher = RetryingFetcher::new(
        Arc::new(MemoryPaginator::new(pages(), CursorKind::Number)),
        RetryConfig::default(),
        CancellationToken::new(),
    );
    let reader = StreamReader::new(descriptor(), SyncMode::Incremental, stored, fetcher);
    assert_eq!(reader.filter().since_for("10"), Some(&CursorValue::Integer(500)));
    assert_eq!(reader.filter().since_for("20"), None);

    let sink = VecSink::new();
    let summary = SyncRun::new(reader, Box::new(CaseConverter))
        .execute(&sink)
        .await
        .unwrap();
    assert_eq!(summary.records_read, 1);
    assert_eq!(sink.records()[0].payload["uid"], "2");
    assert_eq!(summary.state.partitions.get("20"), Some(&CursorValue::Integer(100)));
}

#[tokio::test]
async fn test_partition_watermarks_survive_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.json"));

    run(
        &store,
        MemoryPaginator::new(pages(), CursorKind::Number),
        SyncMode::Incremental,
        &VecSink::new(),
    )
    .await
    .unwrap();

    let stored = store.load().unwrap().stream("memory:cases");
    assert_eq!(stored.partitions.get("10"), Some(&CursorValue::Integer(300)));
    assert_eq!(stored.partitions.get("11"), Some(&CursorValue::Integer(150)));
}

#[tokio::test]
async fn test_full_refresh_rereads_but_never_rewinds() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.json"));
    run(
        &store,
        MemoryPaginator::new(pages(), CursorKind::Number),
        SyncMode::Incremental,
        &VecSink::new(),
    )
    .await
    .unwrap();

    let sink = VecSink::new();
    let older = vec![vec![case(1, 10, 100)]];
    let read = run(
        &store,
        MemoryPaginator::new(older, CursorKind::Number),
        SyncMode::FullRefresh,
        &sink,
    )
    .await
    .unwrap();
    assert_eq!(read, 1);

    let stored = store.load().unwrap().stream("memory:cases");
    assert_eq!(stored.watermark("updated_on"), Some(&CursorValue::Integer(300)));
}

#[tokio::test]
async fn test_malformed_record_is_read_again_after_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.json"));
    let malformed = RawRecord::from_value(json!({ "suite_id": 10, "updated_on": 250 })).unwrap();

    let err = run(
        &store,
        MemoryPaginator::new(vec![vec![case(1, 10, 100), malformed]], CursorKind::Number),
        SyncMode::Incremental,
        &VecSink::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RunError::Convert(_)));
    assert!(store.load().unwrap().stream("memory:cases").is_empty());

    // Upstream fixed the record; it is still above every stored bound.
    let sink = VecSink::new();
    let read = run(
        &store,
        MemoryPaginator::new(vec![vec![case(1, 10, 100), case(2, 10, 250)]], CursorKind::Number),
        SyncMode::Incremental,
        &sink,
    )
    .await
    .unwrap();
    assert_eq!(read, 2);
    assert_eq!(sink.records()[1].payload["uid"], "2");
}
