//! Resumable, mode-aware record source over a retrying fetcher.

use crate::cursor::{CursorKind, CursorTracker, CursorValue};
use crate::fetch::{FetchError, PageToken, ReadFilter, RetryingFetcher};
use crate::record::RawRecord;
use crate::state::StreamState;
use chrono::{Duration as ChronoDuration, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};


/// Whether a stream reads everything or resumes from its watermark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    #[default]
    Incremental,
}

/// Static description of one logical stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub name: String,
    pub cursor_field: String,
    pub cursor_kind: CursorKind,
    pub partition_field: Option<String>,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, cursor_field: impl Into<String>, cursor_kind: CursorKind) -> Self {
        Self {
            name: name.into(),
            cursor_field: cursor_field.into(),
            cursor_kind,
            partition_field: None,
        }
    }

    pub fn partitioned_by(mut self, field: impl Into<String>) -> Self {
        self.partition_field = Some(field.into());
        self
    }
}

/// Pulls pages lazily and yields their records one at a time.
///
/// Every yielded record goes through the cursor tracker before it is handed
/// out. `state()` can be called at any point, including after a failed fetch,
/// and always returns `max(previous, observed)`.
pub struct StreamReader {
    descriptor: StreamDescriptor,
    mode: SyncMode,
    fetcher: RetryingFetcher,
    tracker: CursorTracker,
    previous: StreamState,
    filter: ReadFilter,
    next_token: Option<PageToken>,
    buffer: VecDeque<RawRecord>,
    pages: u64,
    yielded: u64,
}

impl StreamReader {
    pub fn new(
        descriptor: StreamDescriptor,
        mode: SyncMode,
        previous: StreamState,
        fetcher: RetryingFetcher,
    ) -> Self {
        let tracker = CursorTracker::new(
            descriptor.cursor_field.clone(),
            descriptor.cursor_kind,
            descriptor.partition_field.clone(),
            &previous,
        );
        let filter = build_filter(&descriptor, mode, &previous);

        info!(
            stream = %descriptor.name,
            mode = ?mode,
            since = ?filter.since.as_ref().map(ToString::to_string),
            "Stream reader created"
        );

        Self {
            descriptor,
            mode,
            fetcher,
            tracker,
            previous,
            filter,
            next_token: Some(PageToken::Start),
            buffer: VecDeque::new(),
            pages: 0,
            yielded: 0,
        }
    }

    /// Seeds the incremental filter for a stream that has never checkpointed.
    ///
    /// On a partitioned stream the cutoff is the bound for every partition
    /// without a watermark of its own. Only affects the request filter; state
    /// still comes from observed records alone.
    pub fn with_start_cutoff_days(mut self, days: Option<u32>) -> Self {
        let Some(days) = days else {
            return self;
        };
        if self.mode != SyncMode::Incremental || self.filter.since.is_some() {
            return self;
        }

        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let since = match self.descriptor.cursor_kind {
            CursorKind::Timestamp => CursorValue::Timestamp(cutoff),
            CursorKind::Number => CursorValue::Integer(cutoff.timestamp()),
        };
        debug!(stream = %self.descriptor.name, since = %since, "Applying start cutoff");
        self.filter.since = Some(since);
        self
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn filter(&self) -> &ReadFilter {
        &self.filter
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    pub fn records_yielded(&self) -> u64 {
        self.yielded
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_token.is_none() && self.buffer.is_empty()
    }

    /// Retry diagnostics for the most recent page fetch.
    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.fetcher
    }

    /// Next record, or `None` once the upstream reports end of stream.
    ///
    /// A failed fetch keeps the current token, so the reader stays valid and
    /// its state reflects everything yielded before the failure.
    pub async fn next_record(&mut self) -> Result<Option<RawRecord>, FetchError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.tracker.observe(&record);
                self.yielded += 1;
                return Ok(Some(record));
            }

            let Some(token) = self.next_token.take() else {
                return Ok(None);
            };

            let page = match self.fetcher.fetch(&token, &self.filter).await {
                Ok(page) => page,
                Err(err) => {
                    self.next_token = Some(token);
                    return Err(err);
                }
            };

            self.pages += 1;
            debug!(
                stream = %self.descriptor.name,
                page = self.pages,
                items = page.items.len(),
                more = page.next.is_some(),
                "Page received"
            );

            let repeated = matches!(
                (&token, &page.next),
                (PageToken::Next(current), Some(next)) if current == next
            );
            if repeated {
                let message = format!(
                    "upstream returned the same continuation token '{}' twice",
                    page.next.unwrap_or_default()
                );
                self.next_token = Some(token);
                return Err(FetchError::fatal(message));
            }

            self.next_token = page.next.map(PageToken::Next);
            self.buffer.extend(page.items);
        }
    }

    /// The same sequence as `next_record`, as a stream that ends after the
    /// first error.
    pub fn records(&mut self) -> impl Stream<Item = Result<RawRecord, FetchError>> + '_ {
        futures::stream::try_unfold(self, |reader| async move {
            let next = reader.next_record().await?;
            Ok::<_, FetchError>(next.map(|record| (record, reader)))
        })
    }

    /// Checkpointable state: `max(previous, observed)`.
    pub fn state(&self) -> StreamState {
        self.previous.merged(&self.tracker.snapshot())
    }

    pub fn finish(self) -> StreamState {
        let state = self.state();
        info!(
            stream = %self.descriptor.name,
            pages = self.pages,
            records = self.yielded,
            exhausted = self.is_exhausted(),
            "Stream reader finished"
        );
        state
    }
}

fn build_filter(descriptor: &StreamDescriptor, mode: SyncMode, previous: &StreamState) -> ReadFilter {
    match mode {
        SyncMode::FullRefresh => ReadFilter::full_refresh(descriptor.cursor_field.clone()),
        SyncMode::Incremental if descriptor.partition_field.is_some() => ReadFilter {
            cursor_field: descriptor.cursor_field.clone(),
            partition_field: descriptor.partition_field.clone(),
            since: None,
            partition_since: previous.partitions.clone(),
        },
        SyncMode::Incremental => ReadFilter {
            cursor_field: descriptor.cursor_field.clone(),
            partition_field: None,
            since: previous.watermark(&descriptor.cursor_field).cloned(),
            partition_since: Default::default(),
        },
    }
}
