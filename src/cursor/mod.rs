//! Cursor values and the per-stream watermark tracker.
//!
//! A stream declares which field carries its cursor and how that field is
//! ordered. Numbers compare numerically, timestamps chronologically; a number
//! and a timestamp are never comparable.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

mod tracker;
#[cfg(test)]
mod tests;

pub use tracker::CursorTracker;

/// Declared ordering of a stream's cursor field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    Number,
    Timestamp,
}

/// A single observed cursor value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

impl CursorValue {
    /// Reads a cursor value out of a record field under the declared kind.
    ///
    /// Number accepts JSON numbers and numeric strings. Timestamp accepts
    /// RFC 3339 strings, naive ISO-8601 strings (taken as UTC) and integer
    /// epoch milliseconds. Returns `None` for anything else.
    pub fn from_json(value: &Value, kind: CursorKind) -> Option<Self> {
        match (kind, value) {
            (CursorKind::Number, Value::Number(n)) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            (CursorKind::Number, Value::String(s)) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Some(Self::Integer(i));
                }
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Self::Float)
            }
            (CursorKind::Timestamp, Value::String(s)) => parse_timestamp(s).map(Self::Timestamp),
            (CursorKind::Timestamp, Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(Self::Timestamp),
            _ => None,
        }
    }

    pub fn kind(&self) -> CursorKind {
        match self {
            Self::Integer(_) | Self::Float(_) => CursorKind::Number,
            Self::Timestamp(_) => CursorKind::Timestamp,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Timestamp(_) => None,
        }
    }

    /// JSON form used in request filters and state files.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Timestamp(t) => Value::from(t.to_rfc3339()),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl PartialOrd for CursorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Timestamp(_), _) | (_, Self::Timestamp(_)) => None,
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl PartialEq for CursorValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Moves `slot` forward to `candidate` if the candidate is strictly greater.
///
/// An empty slot always takes the candidate. Incomparable values leave the
/// slot untouched. Returns true if the slot changed.
pub fn advance(slot: &mut Option<CursorValue>, candidate: CursorValue) -> bool {
    match slot {
        None => {
            *slot = Some(candidate);
            true
        }
        Some(current) => match candidate.partial_cmp(current) {
            Some(Ordering::Greater) => {
                *current = candidate;
                true
            }
            _ => false,
        },
    }
}
