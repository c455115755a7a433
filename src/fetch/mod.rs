//! Page fetching: the upstream Paginator contract, failure classification
//! and the retrying wrapper around it.

mod classify;
mod memory;
mod paginator;
mod retry;

pub use classify::{StatusClassifier, DEFAULT_TRANSIENT_STATUS_CODES};
pub use memory::MemoryPaginator;
pub use paginator::{FetchError, Page, PageToken, Paginator, ReadFilter};
pub use retry::{BackoffPolicy, RetryConfig, RetryingFetcher};
