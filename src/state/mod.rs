use crate::cursor::{advance, CursorValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod checkpoint;


pub use checkpoint::CheckpointStore;

/// Persisted incremental state for one logical stream.
///
/// Serialized as a flat object of watermark field → value, e.g.
/// `{"updated_on": 1717171717}`. Partitioned streams also carry a
/// `partitions` object of partition key → value. Both only ever advance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Per-partition watermarks for the stream's cursor field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partitions: BTreeMap<String, CursorValue>,

    /// Watermark field → maximum observed value.
    #[serde(flatten)]
    pub watermarks: BTreeMap<String, CursorValue>,
}

impl StreamState {
    pub fn with_watermark(mut self, field: impl Into<String>, value: CursorValue) -> Self {
        self.watermarks.insert(field.into(), value);
        self
    }

    pub fn watermark(&self, field: &str) -> Option<&CursorValue> {
        self.watermarks.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.watermarks.is_empty() && self.partitions.is_empty()
    }

    /// Merges `other` into `self`, keeping the maximum per key.
    ///
    /// Incomparable values (a number against a timestamp) keep the existing
    /// value, so merging never regresses state.
    pub fn merge(&mut self, other: &StreamState) {
        merge_map(&mut self.watermarks, &other.watermarks);
        merge_map(&mut self.partitions, &other.partitions);
    }

    /// Returns `max(self, other)` without mutating either side.
    pub fn merged(&self, other: &StreamState) -> StreamState {
        let mut out = self.clone();
        out.merge(other);
        out
    }
}

fn merge_map(into: &mut BTreeMap<String, CursorValue>, from: &BTreeMap<String, CursorValue>) {
    for (key, value) in from {
        let mut slot = into.remove(key);
        advance(&mut slot, value.clone());
        if let Some(v) = slot {
            into.insert(key.clone(), v);
        }
    }
}

/// State for every stream of a source, keyed by stream name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(BTreeMap<String, StreamState>);

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `stream`, empty if the stream never checkpointed.
    pub fn stream(&self, stream: &str) -> StreamState {
        self.0.get(stream).cloned().unwrap_or_default()
    }

    /// Merges a stream's new state into the stored one and returns the result.
    pub fn merge_stream(&mut self, stream: &str, state: &StreamState) -> StreamState {
        let entry = self.0.entry(stream.to_string()).or_default();
        entry.merge(state);
        entry.clone()
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
