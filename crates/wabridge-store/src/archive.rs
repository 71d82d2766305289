//! Message archive: every received message lands in its own JSON file.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use wabridge_core::{error::BridgeError, message::MessageRecord};

/// Write-only archive of received messages.
#[derive(Debug, Clone)]
pub struct MessageArchive {
    dir: PathBuf,
}

impl MessageArchive {
    /// Create an archive rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `record` as pretty-printed JSON in `received_{unix_millis}.json`.
    ///
    /// Two writes within the same millisecond target the same file and the
    /// later one wins.
    pub async fn persist(&self, record: &MessageRecord) -> Result<PathBuf, BridgeError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BridgeError::Storage(format!(
                "failed to create {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self
            .dir
            .join(format!("received_{}.json", Utc::now().timestamp_millis()));
        let body = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, body).await.map_err(|e| {
            BridgeError::Storage(format!("failed to write {}: {e}", path.display()))
        })?;

        debug!("archived message {} at {}", record.id, path.display());
        Ok(path)
    }
}
