//! Flat-file state store.
//!
//! One `<TAG>.json` snapshot per subject. Commits write a temp file in the
//! same directory, fsync it, then rename over the previous snapshot, so a
//! crash at any point leaves either the old record or the new one, never
//! a torn mix. Leftover temp files from interrupted commits are ignored
//! (and are overwritten by the next commit).

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::store::{StateStore, SubjectRecord};
use crate::error::{Result, WatchError};

/// JSON snapshot store, one file per subject
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if missing) the data directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| WatchError::StateStore(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{}.json", tag))
    }

    fn temp_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", tag))
    }

    fn write_snapshot(path: &Path, temp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = std::fs::File::create(temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(temp, path)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<SubjectRecord>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::new();
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| WatchError::StateStore(format!("cannot read {}: {}", dir.display(), e)))?;

            for entry in entries {
                let entry = entry
                    .map_err(|e| WatchError::StateStore(format!("cannot list {}: {}", dir.display(), e)))?;
                let path = entry.path();
                let name = entry.file_name();
                let name = name.to_string_lossy();

                // Skip temp files left by interrupted commits and anything
                // that is not a snapshot.
                if name.starts_with('.') || !name.ends_with(".json") {
                    continue;
                }

                match std::fs::read(&path)
                    .map_err(WatchError::from)
                    .and_then(|bytes| serde_json::from_slice::<SubjectRecord>(&bytes).map_err(WatchError::from))
                {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "skipping unreadable subject snapshot");
                    }
                }
            }

            debug!(count = records.len(), dir = %dir.display(), "loaded subject snapshots");
            Ok(records)
        })
        .await
        .map_err(|e| WatchError::StateStore(format!("load task panicked: {}", e)))?
    }

    async fn commit(&self, record: &SubjectRecord) -> Result<()> {
        let path = self.snapshot_path(record.tag());
        let temp = self.temp_path(record.tag());
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::task::spawn_blocking(move || {
            Self::write_snapshot(&path, &temp, &bytes)
                .map_err(|e| WatchError::StateStore(format!("commit to {} failed: {}", path.display(), e)))
        })
        .await
        .map_err(|e| WatchError::StateStore(format!("commit task panicked: {}", e)))?
    }

    async fn create_subject(&self, record: &SubjectRecord) -> Result<()> {
        let path = self.snapshot_path(record.tag());
        if path.exists() {
            return Err(WatchError::StateStore(format!(
                "subject record already exists: {}",
                path.display()
            )));
        }
        self.commit(record).await
    }

    async fn delete_subject(&self, tag: &str) -> Result<()> {
        let path = self.snapshot_path(tag);
        let temp = self.temp_path(tag);

        tokio::task::spawn_blocking(move || {
            let _ = std::fs::remove_file(&temp);
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(WatchError::StateStore(format!(
                    "delete of {} failed: {}",
                    path.display(),
                    e
                ))),
            }
        })
        .await
        .map_err(|e| WatchError::StateStore(format!("delete task panicked: {}", e)))?
    }
}
