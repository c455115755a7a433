use super::{StreamState, SyncState};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// File-backed store for `SyncState`.
///
/// Files ending in `.gz` are written as gzip-compressed JSON, anything else
/// as plain JSON. Writes are atomic: temp file, fsync, rename. Clones share
/// one commit lock, so streams committing concurrently never drop each
/// other's updates.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    commit_lock: Arc<Mutex<()>>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored state, or an empty state if no checkpoint exists yet.
    pub fn load(&self) -> Result<SyncState> {
        if !self.path.exists() {
            info!(
                path = %self.path.display(),
                "No checkpoint found, starting without state"
            );
            return Ok(SyncState::new());
        }

        let file = File::open(&self.path).context("Failed to open checkpoint file")?;

        let mut json = String::new();
        if self.is_compressed() {
            GzDecoder::new(file)
                .read_to_string(&mut json)
                .context("Failed to decompress checkpoint file")?;
        } else {
            let mut file = file;
            file.read_to_string(&mut json)
                .context("Failed to read checkpoint file")?;
        }

        let state: SyncState =
            serde_json::from_str(&json).context("Failed to deserialize checkpoint JSON")?;

        debug!(
            path = %self.path.display(),
            streams = state.len(),
            "Loaded checkpoint"
        );

        Ok(state)
    }

    /// Replaces the stored state.
    pub fn save(&self, state: &SyncState) -> Result<()> {
        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize checkpoint")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create checkpoint directory")?;
        }

        let tmp_path = self.path.with_extension("tmp");

        {
            let tmp_file =
                File::create(&tmp_path).context("Failed to create temporary checkpoint file")?;

            let file = if self.is_compressed() {
                let mut encoder = GzEncoder::new(tmp_file, Compression::default());
                encoder
                    .write_all(json.as_bytes())
                    .context("Failed to write compressed checkpoint data")?;
                encoder.finish().context("Failed to finish compression")?
            } else {
                let mut file = tmp_file;
                file.write_all(json.as_bytes())
                    .context("Failed to write checkpoint data")?;
                file
            };

            file.sync_all()
                .context("Failed to sync checkpoint file to disk")?;
        }

        fs::rename(&tmp_path, &self.path)
            .context("Failed to rename temporary checkpoint file")?;

        Ok(())
    }

    /// Merges one stream's state into the stored checkpoint.
    ///
    /// The stored watermark is the maximum of what was there and what is
    /// committed, so committing an older state is a no-op.
    pub fn commit(&self, stream: &str, state: &StreamState) -> Result<StreamState> {
        let _guard = match self.commit_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut all = self.load()?;
        let merged = all.merge_stream(stream, state);
        self.save(&all)?;

        info!(
            stream = %stream,
            path = %self.path.display(),
            "Checkpoint committed"
        );

        Ok(merged)
    }

    fn is_compressed(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "gz")
            .unwrap_or(false)
    }
}
