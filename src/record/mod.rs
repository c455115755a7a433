use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::convert::ConvertError;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{validate_output, ValidationError};

/// Untyped record as returned by an upstream source.
///
/// Field layout is source-defined. Records are immutable once read; the
/// pipeline only borrows them while a converter consumes them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Wraps a JSON object. Returns `None` for any other JSON value.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String value of a field, `None` if absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Field value rendered as a uid component.
    ///
    /// Strings, numbers and booleans are accepted. Missing, null, empty or
    /// structured values are rejected so that no partial uid is ever built.
    pub fn require_key_part(&self, field: &str) -> Result<String, ConvertError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Err(ConvertError::MissingField(field.to_string())),
            Some(Value::String(s)) if s.is_empty() => {
                Err(ConvertError::MissingField(field.to_string()))
            }
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(other) => Err(ConvertError::InvalidField {
                field: field.to_string(),
                reason: format!("expected a scalar, got {}", other),
            }),
        }
    }

    /// Partition key of this record under `field`.
    ///
    /// Strings are used as is, other scalars in their JSON form. Missing and
    /// null values have no partition.
    pub fn partition_key(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Normalized record handed to the sink.
///
/// `model_kind` names the destination model (e.g. `qa_TestCase`); the
/// payload layout is the model's own versioned contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub model_kind: String,
    pub payload: Value,
}

impl OutputRecord {
    pub fn new(model_kind: impl Into<String>, payload: Value) -> Self {
        Self {
            model_kind: model_kind.into(),
            payload,
        }
    }

    /// Checks the envelope before the record leaves the pipeline.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_output(self)
    }
}

/// Reference to another entity by `{uid, source}`.
pub fn entity_ref(uid: &str, source: &str) -> Value {
    serde_json::json!({ "uid": uid, "source": source })
}
