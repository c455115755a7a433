use crate::cursor::CursorValue;
use crate::record::RawRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Where to resume within a page sequence.
///
/// The inner string is produced by the upstream and never interpreted
/// outside the paginator that issued it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageToken {
    Start,
    Next(String),
}

/// One page of raw items plus the continuation token, `None` at end of stream.
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<RawRecord>,
    pub next: Option<String>,
}

impl Page {
    pub fn last(items: Vec<RawRecord>) -> Self {
        Self { items, next: None }
    }

    pub fn with_next(items: Vec<RawRecord>, next: impl Into<String>) -> Self {
        Self {
            items,
            next: Some(next.into()),
        }
    }
}

/// Incremental filter handed to every fetch.
///
/// Empty in full-refresh mode. How the bounds map onto request parameters
/// (`updated_after`, `since`, ...) is up to each source.
///
/// On a partitioned stream `since` never carries the stream-wide watermark,
/// only the start cutoff when one is configured. Each partition resumes from
/// its own entry in `partition_since`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadFilter {
    pub cursor_field: String,
    pub partition_field: Option<String>,
    pub since: Option<CursorValue>,
    pub partition_since: BTreeMap<String, CursorValue>,
}

impl ReadFilter {
    pub fn full_refresh(cursor_field: impl Into<String>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            ..Self::default()
        }
    }

    /// Lower bound for one partition.
    ///
    /// A partition with no watermark of its own falls back to `since`, which
    /// is at most the start cutoff on a partitioned stream.
    pub fn since_for(&self, partition: &str) -> Option<&CursorValue> {
        self.partition_since.get(partition).or(self.since.as_ref())
    }

    /// Lower bound that applies to `record`: its partition's bound when the
    /// filter is partitioned, `since` otherwise.
    pub fn bound_for(&self, record: &RawRecord) -> Option<&CursorValue> {
        match &self.partition_field {
            Some(field) => match record.partition_key(field) {
                Some(key) => self.since_for(&key),
                None => self.since.as_ref(),
            },
            None => self.since.as_ref(),
        }
    }
}

/// Upstream failure, classified for the retry layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Rate limits, timeouts, 5xx. Safe to retry.
    #[error("transient upstream failure{}: {message}", fmt_status(.status))]
    Transient { status: Option<u16>, message: String },

    /// Auth failures, malformed requests. Never retried.
    #[error("fatal upstream failure{}: {message}", fmt_status(.status))]
    Fatal { status: Option<u16>, message: String },

    #[error("fetch cancelled")]
    Cancelled,
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Fatal { status, .. } => *status,
            Self::Cancelled => None,
        }
    }
}

/// Fetches one page from an upstream source.
///
/// Implementations must not mutate shared state: repeating a fetch with the
/// same token and filter must be safe, since the retry layer does exactly
/// that after a transient failure.
#[async_trait]
pub trait Paginator: Send + Sync {
    async fn fetch(&self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError>;
}
