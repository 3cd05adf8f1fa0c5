use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::media::MediaError;

/// Scoped owner of a temp file: the file is removed when the guard drops
/// unless ownership is released with [`keep`](Self::keep).
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Takes ownership of `path`, whether or not the file exists yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writes `contents` to `path` and returns its guard. A partially
    /// written file is removed as well.
    pub async fn write(path: impl Into<PathBuf>, contents: &[u8]) -> Result<Self, MediaError> {
        let artifact = Self::new(path);
        tokio::fs::write(&artifact.path, contents)
            .await
            .map_err(|e| MediaError::io(&artifact.path, e))?;
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases ownership; the file is no longer removed on drop.
    pub fn keep(mut self) -> PathBuf {
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temp artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temp artifact");
            }
        }
    }
}

/// Per-invocation file name suffix: nanosecond timestamp plus a random tag
pub fn unique_suffix() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let tag = Uuid::new_v4().simple().to_string();
    format!("{}_{}", nanos, &tag[..8])
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<(), MediaError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| MediaError::io(dir, e))
}

/// Deletes regular files in `dir` last modified more than `max_age` ago and
/// returns how many were removed. A missing directory counts as empty.
pub async fn sweep_stale_artifacts(dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read temp directory for sweep");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Temp directory sweep interrupted");
                break;
            }
        };

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale temp file"),
        }
    }

    if removed > 0 {
        debug!(
            dir = %dir.display(),
            removed = removed,
            max_age_secs = max_age.as_secs(),
            "Swept stale temp artifacts"
        );
    }
    removed
}
