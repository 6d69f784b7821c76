//! Persistent record of completed jobs.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::jsonstore::{load_json, save_json_atomic};
use crate::media::MediaProbe;
use crate::pipeline::JobSnapshot;

/// Newest records first; the list is capped so the file stays small.
const MAX_RECORDS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryRecord {
    pub task_id: String,
    pub result_files: Vec<String>,
    #[serde(default)]
    pub metadata: Option<MediaProbe>,
}

/// `library.json` store: completed downloads and separations.
pub struct LibraryStore {
    path: PathBuf,
    records: RwLock<Vec<LibraryRecord>>,
}

impl LibraryStore {
    pub async fn load(path: PathBuf) -> Self {
        let records = match load_json::<Vec<LibraryRecord>>(&path).await {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), "corrupt library file ({e}), starting fresh");
                Vec::new()
            }
        };
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    /// Insert a completed job at the front; duplicate ids are ignored.
    pub async fn record(&self, snapshot: &JobSnapshot) -> io::Result<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.task_id == snapshot.task_id) {
            return Ok(());
        }
        records.insert(
            0,
            LibraryRecord {
                task_id: snapshot.task_id.clone(),
                result_files: snapshot.result_files.clone(),
                metadata: snapshot.metadata.clone(),
            },
        );
        records.truncate(MAX_RECORDS);
        save_json_atomic(&self.path, &*records).await
    }

    /// List records, pruning entries whose primary file is gone.
    pub async fn list(&self) -> Vec<LibraryRecord> {
        let mut records = self.records.write().await;
        let mut kept = Vec::with_capacity(records.len());
        let mut pruned = false;

        for record in records.iter() {
            let alive = match record.result_files.first() {
                Some(path) => tokio::fs::metadata(path).await.is_ok(),
                None => false,
            };
            if alive {
                kept.push(record.clone());
            } else {
                debug!(task_id = %record.task_id, "pruning library entry with missing file");
                pruned = true;
            }
        }

        if pruned {
            *records = kept.clone();
            if let Err(e) = save_json_atomic(&self.path, &*records).await {
                warn!("failed to persist pruned library: {e}");
            }
        }
        kept
    }

    /// Remove a record and delete its primary file from disk.
    pub async fn remove(&self, task_id: &str) -> io::Result<bool> {
        let mut records = self.records.write().await;
        let Some(pos) = records.iter().position(|r| r.task_id == task_id) else {
            return Ok(false);
        };
        let record = records.remove(pos);

        if let Some(path) = record.result_files.first() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path, "deleted library file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path, "failed to delete library file: {e}"),
            }
        }

        save_json_atomic(&self.path, &*records).await?;
        Ok(true)
    }
}
