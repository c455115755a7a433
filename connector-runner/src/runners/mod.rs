//! Runners that drive connectors on a schedule.

pub mod scheduler;

pub use scheduler::{SyncScheduler, SyncStatus};
