//! Graphline connector runner - scheduled syncs from QA sources.
//!
//! Each configured connector exposes one or more streams. The runner gives
//! every stream its own scheduler, which on each tick resumes from the
//! stream's checkpoint, reads and converts new records, writes them to the
//! destination and commits the new checkpoint.
//!
//! ```text
//! CircleCI / TestRails API
//!          ↓
//!     Paginator (per connector)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │  graphline::SyncRun                      │
//! │  reader → converter → sink               │
//! └─────────────────────────────────────────┘
//!          ↓                     ↓
//!     HttpSink            CheckpointStore
//! ```

pub mod config;
pub mod connector;
pub mod connectors;
pub mod http;
pub mod manager;
pub mod registry;
pub mod runners;
pub mod sink;

pub use config::RunnerConfig;
pub use connector::Connector;
pub use manager::SyncManager;
pub use sink::HttpSink;
