//! One sync run: reader → converter → sink.

use crate::convert::{ConvertError, Converter};
use crate::fetch::FetchError;
use crate::reader::StreamReader;
use crate::record::{OutputRecord, ValidationError};
use crate::state::StreamState;
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;


/// Destination for normalized records.
///
/// Writes must be idempotent upserts keyed by record uid; a failed run is
/// re-read from its last checkpoint, so the same record may arrive twice.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, records: Vec<OutputRecord>) -> anyhow::Result<()>;
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    records: Mutex<Vec<OutputRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutputRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn of_kind(&self, model_kind: &str) -> Vec<OutputRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.model_kind == model_kind)
            .collect()
    }
}

#[async_trait]
impl RecordSink for VecSink {
    async fn write(&self, records: Vec<OutputRecord>) -> anyhow::Result<()> {
        let mut guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend(records);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(FetchError),

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("converter emitted an invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("sink write failed: {0:#}")]
    Sink(anyhow::Error),

    #[error("run cancelled")]
    Cancelled,
}

impl From<FetchError> for RunError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Fetch(other),
        }
    }
}

impl RunError {
    /// Whether the failure state can be checkpointed without losing output.
    ///
    /// Convert, sink and validation failures happen after a record was
    /// yielded but before its outputs reached the destination, so the failed
    /// record's cursor value is already part of the state.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Cancelled)
    }
}

/// Outcome of a run that read its stream to the end.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub state: StreamState,
}

/// Terminal error plus the highest state reached before it.
#[derive(Debug, Error)]
#[error("sync run {run_id} failed: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    #[source]
    pub error: RunError,
    pub state: StreamState,
}

pub struct SyncRun {
    id: Uuid,
    reader: StreamReader,
    converter: Box<dyn Converter>,
    skip_malformed: bool,
    cancel: CancellationToken,
    records_read: u64,
    records_written: u64,
    records_skipped: u64,
}

impl SyncRun {
    /// The run shares the fetcher's cancellation token, so cancelling it
    /// also interrupts an in-flight fetch or backoff sleep.
    pub fn new(reader: StreamReader, converter: Box<dyn Converter>) -> Self {
        let cancel = reader.fetcher().cancel_token().clone();
        Self {
            id: Uuid::now_v7(),
            reader,
            converter,
            skip_malformed: false,
            cancel,
            records_read: 0,
            records_written: 0,
            records_skipped: 0,
        }
    }

    /// Log and skip records the converter rejects instead of failing.
    pub fn with_skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drives the run to completion.
    ///
    /// Aggregates are flushed only after the reader reports end of stream.
    /// On any failure the converter is dropped with its open aggregates.
    pub async fn execute(mut self, sink: &dyn RecordSink) -> Result<RunSummary, RunFailure> {
        let stream = self.reader.descriptor().name.clone();
        info!(
            run_id = %self.id,
            stream = %stream,
            source = %self.converter.source(),
            mode = ?self.reader.mode(),
            "Sync run started"
        );

        match self.drive(sink).await {
            Ok(()) => {
                let summary = RunSummary {
                    run_id: self.id,
                    records_read: self.records_read,
                    records_written: self.records_written,
                    records_skipped: self.records_skipped,
                    state: self.reader.finish(),
                };
                info!(
                    run_id = %summary.run_id,
                    stream = %stream,
                    read = summary.records_read,
                    written = summary.records_written,
                    skipped = summary.records_skipped,
                    "Sync run completed"
                );
                Ok(summary)
            }
            Err(error) => {
                error!(
                    run_id = %self.id,
                    stream = %stream,
                    read = self.records_read,
                    error = %error,
                    "Sync run failed"
                );
                Err(RunFailure {
                    run_id: self.id,
                    error,
                    state: self.reader.finish(),
                })
            }
        }
    }

    async fn drive(&mut self, sink: &dyn RecordSink) -> Result<(), RunError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let Some(record) = self.reader.next_record().await? else {
                break;
            };
            self.records_read += 1;

            let outputs = match self.converter.process_record(&record) {
                Ok(outputs) => outputs,
                Err(err) if self.skip_malformed => {
                    warn!(run_id = %self.id, error = %err, "Skipping malformed record");
                    self.records_skipped += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            self.emit(sink, outputs).await?;
        }

        let aggregates = self.converter.on_complete();
        debug!(run_id = %self.id, count = aggregates.len(), "Flushing aggregates");
        self.emit(sink, aggregates).await
    }

    async fn emit(&mut self, sink: &dyn RecordSink, outputs: Vec<OutputRecord>) -> Result<(), RunError> {
        if outputs.is_empty() {
            return Ok(());
        }
        for output in &outputs {
            output.validate()?;
        }
        let count = outputs.len() as u64;
        sink.write(outputs).await.map_err(RunError::Sink)?;
        self.records_written += count;
        Ok(())
    }
}
