//! Sync manager: starts one scheduler per connector stream and owns their
//! lifecycle.

use crate::runners::scheduler::{SyncScheduler, SyncStatus};
use crate::Connector;
use anyhow::Result;
use graphline::config::SyncConfig;
use graphline::{CheckpointStore, RecordSink};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type StatusMap = Arc<tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<SyncStatus>>>>>;

/// Grace period for in-flight runs to commit after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Orchestrates all connector schedulers.
///
/// All schedulers share one checkpoint store, one sink and one
/// cancellation token.
pub struct SyncManager {
    connectors: Vec<Arc<dyn Connector>>,
    settings: SyncConfig,
    store: CheckpointStore,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
    /// Status tracking per `connector:stream` key
    status_map: StatusMap,
    handles: HashMap<String, JoinHandle<()>>,
}

impl SyncManager {
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        settings: SyncConfig,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let store = CheckpointStore::new(settings.checkpoint.path.clone());
        Self {
            connectors,
            settings,
            store,
            sink,
            cancel: CancellationToken::new(),
            status_map: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            handles: HashMap::new(),
        }
    }

    /// Returns a clone of the status map for external monitoring.
    pub fn status_map(&self) -> StatusMap {
        Arc::clone(&self.status_map)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts a scheduler for every stream of every connector.
    ///
    /// # Returns
    /// Number of schedulers started
    pub async fn start(&mut self) -> Result<usize> {
        info!(connector_count = self.connectors.len(), "Starting sync manager");

        if self.connectors.is_empty() {
            warn!("No connectors configured, nothing to start");
            return Ok(0);
        }

        let mut started = 0;
        for connector in self.connectors.clone() {
            for descriptor in connector.streams() {
                let scheduler = SyncScheduler::new(
                    Arc::clone(&connector),
                    descriptor,
                    self.settings.clone(),
                    self.store.clone(),
                    Arc::clone(&self.sink),
                    self.cancel.child_token(),
                );
                let key = scheduler.state_key();
                let status = scheduler.status();

                if let Some(old) = self.handles.remove(&key) {
                    old.abort();
                    warn!(key = %key, "Replaced duplicate scheduler");
                }
                self.handles.insert(key.clone(), scheduler.start());
                self.status_map.lock().await.insert(key.clone(), status);

                info!(key = %key, "Sync scheduler started");
                started += 1;
            }
        }

        Ok(started)
    }

    /// Cancels all schedulers and waits for in-flight runs to commit.
    ///
    /// Tasks still running after the grace period are aborted.
    pub async fn shutdown(&mut self) {
        info!("Shutting down sync manager");
        self.cancel.cancel();

        let count = self.handles.len();
        for (key, mut handle) in self.handles.drain() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(key = %key, error = %e, "Scheduler task failed"),
                Err(_) => {
                    warn!(key = %key, "Scheduler did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        info!(scheduler_count = count, "All schedulers stopped");
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
