//! Durable checkpoint records, one JSON file per physical file.
//!
//! Records are keyed by [`FileId`] so they follow a file through
//! renames and go stale (rather than wrong) when a path is recreated.
//! Writes are atomic: write to a temp file, verify the bytes landed,
//! then rename into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::file_id::FileId;

/// A persisted confirmed read position for one physical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Path the file had when the record was written.
    pub file_path: PathBuf,
    /// Confirmed byte offset. Only a safe seek target when recorded at
    /// end of stream; callers decide that, not the store.
    pub bytes: u64,
    /// Confirmed line count.
    pub lines: u64,
    /// Identity the record is keyed by.
    pub file_id: FileId,
}

/// A directory of checkpoint records.
///
/// Distinct identities map to distinct record files, so independent
/// tails can share one store without coordination.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Opens a store rooted at `dir`, creating the directory if it does
    /// not exist yet.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Config {
                    message: format!("checkpoint path is not a directory: {}", dir.display()),
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&dir).await?;
                info!(dir = %dir.display(), "created checkpoint directory");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self { dir })
    }

    fn record_path(&self, id: FileId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Loads the record for the file currently at `path`.
    ///
    /// Returns `None` when the file or record is missing, the record is
    /// empty, or the record describes more bytes than the file now
    /// holds. The last case means the file shrank since the save, which
    /// invalidates the line count as much as the byte offset.
    pub async fn load(&self, path: &Path) -> Result<Option<Checkpoint>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let id = FileId::from_metadata(&metadata);

        let data = match tokio::fs::read(self.record_path(id)).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if data.is_empty() {
            warn!(id = %id, "empty checkpoint record, ignoring");
            return Ok(None);
        }

        let mark: Checkpoint = serde_json::from_slice(&data)?;
        if mark.bytes > metadata.len() {
            info!(
                id = %id,
                recorded = mark.bytes,
                actual = metadata.len(),
                "checkpoint describes a larger file, discarding"
            );
            return Ok(None);
        }

        debug!(id = %id, lines = mark.lines, bytes = mark.bytes, "checkpoint loaded");
        Ok(Some(mark))
    }

    /// Persists the confirmed position for the file currently at
    /// `path`, keyed by its present identity.
    ///
    /// A failed write is retried once after a 1-3 second randomized
    /// pause; a second failure is returned as [`Error::CheckpointSave`].
    pub async fn save(&self, path: &Path, lines: u64, bytes: u64) -> Result<Checkpoint> {
        let metadata = tokio::fs::metadata(path).await?;
        let id = FileId::from_metadata(&metadata);

        let record = Checkpoint {
            file_path: path.to_path_buf(),
            bytes,
            lines,
            file_id: id,
        };
        let contents = serde_json::to_vec(&record)?;
        let record_path = self.record_path(id);

        if let Err(err) = atomic_write(&record_path, &contents).await {
            // Writes that report success but land empty or missing have
            // been observed on some filesystems. Pause and retry once.
            let delay = Duration::from_secs(rand::rng().random_range(1..=3));
            warn!(
                error = %err,
                delay_secs = delay.as_secs(),
                "checkpoint write failed, retrying"
            );
            tokio::time::sleep(delay).await;
            atomic_write(&record_path, &contents)
                .await
                .map_err(|err| Error::CheckpointSave {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
        }

        info!(id = %id, lines, bytes, "checkpoint saved");
        Ok(record)
    }
}

async fn atomic_write(record_path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = record_path.with_extension("tmp");
    tokio::fs::write(&temp_path, contents).await?;

    // Verify the bytes actually landed before renaming into place.
    let written = tokio::fs::metadata(&temp_path).await?;
    if written.len() == 0 {
        return Err(Error::CheckpointSave {
            path: temp_path.display().to_string(),
            message: "temp record is empty".to_string(),
        });
    }

    tokio::fs::rename(&temp_path, record_path).await?;
    Ok(())
}
