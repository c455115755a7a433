use super::{advance, CursorKind, CursorValue};
use crate::record::RawRecord;
use crate::state::StreamState;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Folds observed cursor values into a monotonic watermark.
///
/// The stream-level watermark is the maximum of the incoming state and every
/// observed value. When a partition field is configured, each partition key
/// also keeps its own maximum. Neither ever decreases within a run.
#[derive(Debug)]
pub struct CursorTracker {
    field: String,
    kind: CursorKind,
    partition_field: Option<String>,
    watermark: Option<CursorValue>,
    partitions: BTreeMap<String, CursorValue>,
}

impl CursorTracker {
    /// Creates a tracker seeded from the incoming stream state.
    pub fn new(
        field: impl Into<String>,
        kind: CursorKind,
        partition_field: Option<String>,
        initial: &StreamState,
    ) -> Self {
        let field = field.into();
        let watermark = initial.watermark(&field).cloned();

        if let Some(value) = &watermark {
            if value.kind() != kind {
                warn!(
                    field = %field,
                    value = %value,
                    "Stored watermark does not match the declared cursor kind"
                );
            }
        }

        Self {
            field,
            kind,
            partition_field,
            watermark,
            partitions: initial.partitions.clone(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }

    /// Folds one record's cursor value into the watermark.
    ///
    /// Records without a usable cursor value leave the watermark as is.
    pub fn observe(&mut self, record: &RawRecord) {
        let Some(raw) = record.get(&self.field) else {
            debug!(field = %self.field, "Record has no cursor field");
            return;
        };
        let Some(value) = CursorValue::from_json(raw, self.kind) else {
            warn!(field = %self.field, value = %raw, "Unparseable cursor value, ignoring");
            return;
        };

        if let Some(key) = self.partition_key(record) {
            let mut slot = self.partitions.remove(&key);
            advance(&mut slot, value.clone());
            if let Some(v) = slot {
                self.partitions.insert(key, v);
            }
        }

        advance(&mut self.watermark, value);
    }

    fn partition_key(&self, record: &RawRecord) -> Option<String> {
        record.partition_key(self.partition_field.as_ref()?)
    }

    /// Current stream-level watermark, `None` if nothing was ever seen.
    pub fn current_watermark(&self) -> Option<&CursorValue> {
        self.watermark.as_ref()
    }

    /// Persistable state for the watermark seen so far.
    pub fn snapshot(&self) -> StreamState {
        let mut state = StreamState::default();
        if let Some(value) = &self.watermark {
            state.watermarks.insert(self.field.clone(), value.clone());
        }
        state.partitions = self.partitions.clone();
        state
    }
}
