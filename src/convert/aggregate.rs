use super::StatusCategory;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-category result counts. `total` always equals the sum of the others.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounters {
    success: u64,
    failure: u64,
    skipped: u64,
    unknown: u64,
    custom: u64,
    total: u64,
}

impl OutcomeCounters {
    pub fn record(&mut self, category: StatusCategory) {
        match category {
            StatusCategory::Success => self.success += 1,
            StatusCategory::Failure => self.failure += 1,
            StatusCategory::Skipped => self.skipped += 1,
            StatusCategory::Unknown => self.unknown += 1,
            StatusCategory::Custom => self.custom += 1,
        }
        self.total += 1;
        debug_assert!(self.is_consistent(), "counter total drifted: {:?}", self);
    }

    pub fn success(&self) -> u64 {
        self.success
    }

    pub fn failure(&self) -> u64 {
        self.failure
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn unknown(&self) -> u64 {
        self.unknown
    }

    pub fn custom(&self) -> u64 {
        self.custom
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.success + self.failure + self.skipped + self.unknown + self.custom
    }
}

/// Entity built from many contributing records and emitted once at run end.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateEntity {
    pub uid: String,
    /// Descriptive fields captured from the first contributing record.
    pub fields: Map<String, Value>,
    status: StatusCategory,
    counters: OutcomeCounters,
}

impl AggregateEntity {
    fn new(uid: &str, fields: Map<String, Value>) -> Self {
        Self {
            uid: uid.to_string(),
            fields,
            status: StatusCategory::Success,
            counters: OutcomeCounters::default(),
        }
    }

    /// `Success` until any contributing record fails, `Failure` from then on.
    pub fn status(&self) -> StatusCategory {
        self.status
    }

    pub fn counters(&self) -> &OutcomeCounters {
        &self.counters
    }

    fn apply(&mut self, category: StatusCategory) {
        self.counters.record(category);
        if category == StatusCategory::Failure {
            self.status = StatusCategory::Failure;
        }
    }
}

/// In-memory table of partially built aggregates for one run.
///
/// Entities are kept in first-seen order, which is also the flush order.
#[derive(Debug, Default)]
pub struct AggregateAccumulator {
    entries: Vec<AggregateEntity>,
    index: HashMap<String, usize>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one contributing outcome into the aggregate `uid`.
    ///
    /// `seed` builds the descriptive fields and is only invoked the first
    /// time `uid` is seen.
    pub fn update<F>(&mut self, uid: &str, seed: F, category: StatusCategory)
    where
        F: FnOnce() -> Map<String, Value>,
    {
        let position = match self.index.get(uid) {
            Some(&position) => position,
            None => {
                self.entries.push(AggregateEntity::new(uid, seed()));
                self.index.insert(uid.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[position].apply(category);
    }

    pub fn get(&self, uid: &str) -> Option<&AggregateEntity> {
        self.index.get(uid).map(|&position| &self.entries[position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains every aggregate in first-seen order, leaving the table empty.
    pub fn flush_all(&mut self) -> Vec<AggregateEntity> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}
