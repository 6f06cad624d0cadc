//! Optional JSON-lines log of raw modem status.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Appends one JSON document per line. The file is opened on first write and
/// reopened when the configured path changes.
#[derive(Default)]
pub struct MobileLog {
    file: Mutex<Option<(PathBuf, File)>>,
}

impl MobileLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` to `path`. Failures are logged, never returned.
    pub async fn append(&self, path: &Path, record: &Value) {
        if let Err(e) = self.try_append(path, record).await {
            warn!("Mobile log {}: {e}", path.display());
        }
    }

    async fn try_append(&self, path: &Path, record: &Value) -> std::io::Result<()> {
        let mut slot = self.file.lock().await;
        if !matches!(slot.as_ref(), Some((open, _)) if open.as_path() == path) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            *slot = Some((path.to_path_buf(), file));
        }
        if let Some((_, file)) = slot.as_mut() {
            let mut line = record.to_string();
            line.push('\n');
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}
