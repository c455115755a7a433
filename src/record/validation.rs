use super::OutputRecord;
use std::fmt;

/// Validation errors for OutputRecord
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingModelKind,
    InvalidModelKind(String),
    PayloadNotObject(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingModelKind => write!(f, "model kind is required"),
            ValidationError::InvalidModelKind(kind) => write!(
                f,
                "invalid model kind '{}': must be <namespace>_<Name>",
                kind
            ),
            ValidationError::PayloadNotObject(kind) => {
                write!(f, "payload of '{}' must be a JSON object", kind)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates an OutputRecord before it is written to the sink.
///
/// Rules:
/// - Model kind: lowercase namespace, underscore, alphanumeric name
///   starting with an uppercase letter (e.g. "qa_TestCase")
/// - Payload: must be a JSON object
pub fn validate_output(record: &OutputRecord) -> Result<(), ValidationError> {
    if record.model_kind.is_empty() {
        return Err(ValidationError::MissingModelKind);
    }

    if !is_valid_model_kind(&record.model_kind) {
        return Err(ValidationError::InvalidModelKind(record.model_kind.clone()));
    }

    if !record.payload.is_object() {
        return Err(ValidationError::PayloadNotObject(record.model_kind.clone()));
    }

    Ok(())
}

fn is_valid_model_kind(kind: &str) -> bool {
    let Some((namespace, name)) = kind.split_once('_') else {
        return false;
    };

    if namespace.is_empty() || !namespace.chars().all(|c| c.is_ascii_lowercase()) {
        return false;
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}
