//! Conversion of raw records into normalized output records.
//!
//! A [`Converter`] is owned by exactly one run. It keeps its own
//! [`EntityDeduplicator`] and [`AggregateAccumulator`]; both are dropped with
//! the converter, so aggregates still open when a run aborts are never
//! emitted.

use crate::record::{OutputRecord, RawRecord};
use thiserror::Error;

mod aggregate;
mod dedup;
mod status;

pub use aggregate::{AggregateAccumulator, AggregateEntity, OutcomeCounters};
pub use dedup::EntityDeduplicator;
pub use status::{classify_status, StatusCategory, TestStatus, UNKNOWN_STATUS_DETAIL};

/// Per-record conversion failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConvertError {
    #[error("record is missing required field '{0}'")]
    MissingField(String),

    #[error("record field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Stateful mapping from a stream's raw records to output records.
///
/// `process_record` is called once per record in upstream order and
/// `on_complete` exactly once after the last record of a successful run.
pub trait Converter: Send {
    /// Source name stamped on every emitted entity reference.
    fn source(&self) -> &str;

    /// Model kinds this converter may emit.
    fn destination_models(&self) -> &[&'static str];

    fn process_record(&mut self, record: &RawRecord) -> Result<Vec<OutputRecord>, ConvertError>;

    /// Flushes accumulated aggregates.
    fn on_complete(&mut self) -> Vec<OutputRecord>;
}

/// Joins uid components with `_`.
pub fn join_uid<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("_")
}

/// Derives a uid by concatenating the given fields of a record.
///
/// Every field is required; a missing one fails the whole derivation.
pub fn uid_from_fields(record: &RawRecord, fields: &[&str]) -> Result<String, ConvertError> {
    let parts = fields
        .iter()
        .map(|field| record.require_key_part(field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(join_uid(parts))
}
