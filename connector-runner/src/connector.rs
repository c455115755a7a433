use anyhow::Result;
use graphline::convert::Converter;
use graphline::fetch::Paginator;
use graphline::reader::StreamDescriptor;
use std::sync::Arc;

/// Source integration managed by the runner.
///
/// A connector describes its streams and hands out, per stream, a stateless
/// paginator and a fresh converter. It holds no run state of its own: cursor
/// state lives in the checkpoint store and dedup/aggregate state in the
/// converter, which is created anew for every run.
///
/// # Example
/// ```no_run
/// use anyhow::{bail, Result};
/// use connector_runner::Connector;
/// use graphline::convert::Converter;
/// use graphline::fetch::{MemoryPaginator, Paginator};
/// use graphline::reader::StreamDescriptor;
/// use graphline::CursorKind;
/// use std::sync::Arc;
///
/// struct StaticConnector;
///
/// impl Connector for StaticConnector {
///     fn name(&self) -> &str {
///         "static"
///     }
///
///     fn streams(&self) -> Vec<StreamDescriptor> {
///         vec![StreamDescriptor::new("items", "updated_at", CursorKind::Timestamp)]
///     }
///
///     fn paginator(&self, _stream: &str) -> Result<Arc<dyn Paginator>> {
///         Ok(Arc::new(MemoryPaginator::new(vec![], CursorKind::Timestamp)))
///     }
///
///     fn converter(&self, stream: &str) -> Result<Box<dyn Converter>> {
///         bail!("no converter for stream '{}'", stream)
///     }
///
///     fn sync_interval(&self) -> u64 {
///         300
///     }
/// }
/// ```
pub trait Connector: Send + Sync {
    /// Unique lowercase identifier, used in checkpoint keys and logs.
    fn name(&self) -> &str;

    fn streams(&self) -> Vec<StreamDescriptor>;

    fn paginator(&self, stream: &str) -> Result<Arc<dyn Paginator>>;

    /// A new converter for one run of `stream`.
    fn converter(&self, stream: &str) -> Result<Box<dyn Converter>>;

    /// Seconds between scheduled runs.
    fn sync_interval(&self) -> u64;
}
