//! In-memory paginator for tests and doc examples.

use super::{FetchError, Page, PageToken, Paginator, ReadFilter};
use crate::cursor::{CursorKind, CursorValue};
use crate::record::RawRecord;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Paginator over pages held in memory, for tests and doc examples.
///
/// Tokens are page indexes. Items at or below their bound (`since`, or their
/// partition's bound on a partitioned filter) are dropped, the way an
/// upstream `updated_after` filter would. Failures can be queued per page
/// index to exercise retry and abort paths.
pub struct MemoryPaginator {
    pages: Vec<Vec<RawRecord>>,
    cursor_kind: CursorKind,
    failures: Mutex<HashMap<usize, VecDeque<FetchError>>>,
    filters: Mutex<Vec<ReadFilter>>,
    calls: AtomicU32,
}

impl MemoryPaginator {
    pub fn new(pages: Vec<Vec<RawRecord>>, cursor_kind: CursorKind) -> Self {
        Self {
            pages,
            cursor_kind,
            failures: Mutex::new(HashMap::new()),
            filters: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Queues `errors` to be returned, in order, before page `index` is served.
    pub fn fail_page(self, index: usize, errors: impl IntoIterator<Item = FetchError>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(index).or_default().extend(errors);
        }
        self
    }

    /// Total fetch calls, including failed ones.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Filters received, one per call.
    pub fn filters(&self) -> Vec<ReadFilter> {
        self.filters.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn keep(&self, record: &RawRecord, filter: &ReadFilter) -> bool {
        let Some(since) = filter.bound_for(record) else {
            return true;
        };
        record
            .get(&filter.cursor_field)
            .and_then(|v| CursorValue::from_json(v, self.cursor_kind))
            .map_or(true, |v| v > *since)
    }
}

#[async_trait]
impl Paginator for MemoryPaginator {
    async fn fetch(&self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut filters) = self.filters.lock() {
            filters.push(filter.clone());
        }

        let index = match token {
            PageToken::Start => 0,
            PageToken::Next(s) => s
                .parse::<usize>()
                .map_err(|_| FetchError::fatal(format!("malformed page token '{}'", s)))?,
        };

        let queued = match self.failures.lock() {
            Ok(mut failures) => failures.get_mut(&index).and_then(VecDeque::pop_front),
            Err(_) => None,
        };
        if let Some(err) = queued {
            return Err(err);
        }

        let items = self
            .pages
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|r| self.keep(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(Page { items, next })
    }
}
