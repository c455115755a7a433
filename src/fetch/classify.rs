use super::FetchError;
use std::collections::BTreeSet;

/// Status codes treated as transient when a connector does not override them.
pub const DEFAULT_TRANSIENT_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Per-connector table deciding which HTTP statuses are retryable.
///
/// Connectors disagree on which codes are transient, so the table is data
/// rather than logic: every non-2xx status not listed here is fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusClassifier {
    transient: BTreeSet<u16>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_STATUS_CODES.iter().copied())
    }
}

impl StatusClassifier {
    pub fn new(transient: impl IntoIterator<Item = u16>) -> Self {
        Self {
            transient: transient.into_iter().collect(),
        }
    }

    pub fn is_transient(&self, status: u16) -> bool {
        self.transient.contains(&status)
    }

    /// Maps a failed HTTP status to a classified fetch error.
    pub fn classify(&self, status: u16, message: impl Into<String>) -> FetchError {
        let message = message.into();
        if self.is_transient(status) {
            FetchError::Transient {
                status: Some(status),
                message,
            }
        } else {
            FetchError::Fatal {
                status: Some(status),
                message,
            }
        }
    }
}
