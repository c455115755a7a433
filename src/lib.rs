// Raw and normalized record types
pub mod record;

// Watermark values and per-stream cursor tracking
pub mod cursor;

// Persisted stream state and checkpoint files
pub mod state;

// Paginator contract, failure classification and retry
pub mod fetch;

// Resumable, mode-aware stream reader
pub mod reader;

// Stateful record conversion: dedup, aggregates, status mapping
pub mod convert;

// Run driver and sinks
pub mod run;

// TOML configuration
pub mod config;

pub use convert::{Converter, ConvertError};
pub use cursor::{CursorKind, CursorValue};
pub use fetch::{FetchError, Page, PageToken, Paginator, ReadFilter, RetryingFetcher};
pub use reader::{StreamDescriptor, StreamReader, SyncMode};
pub use record::{OutputRecord, RawRecord};
pub use run::{RecordSink, RunError, RunFailure, RunSummary, SyncRun, VecSink};
pub use state::{CheckpointStore, StreamState, SyncState};
