//! Folder batch queue: scan a directory, separate the selected files.
//!
//! Batches are in-memory only; each lives for the process lifetime.
//! Scanning is non-recursive: subdirectories are ignored. Running batch
//! items are bounded by `batch_workers`, a knob separate from the
//! separation pool so a large batch cannot monopolize it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

use crate::media::{is_media_file, MediaToolkit};
use crate::pipeline::{ModelSelection, SeparationOptions, SeparationPipeline};

use super::types::{BatchItem, BatchItemStatus};
use super::QueueError;

/// How often a batch worker samples its child job's state.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Aggregate view of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub total_files: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub files: Vec<BatchItem>,
}

pub struct BatchManager {
    pipeline: Arc<SeparationPipeline>,
    tools: Arc<dyn MediaToolkit>,
    batches: Arc<RwLock<HashMap<String, Vec<BatchItem>>>>,
    /// Bounds concurrent batch separations; sized by `batch_workers`.
    batch_slots: Arc<Semaphore>,
}

impl BatchManager {
    pub fn new(
        pipeline: Arc<SeparationPipeline>,
        tools: Arc<dyn MediaToolkit>,
        batch_workers: usize,
    ) -> Self {
        Self {
            pipeline,
            tools,
            batches: Arc::new(RwLock::new(HashMap::new())),
            batch_slots: Arc::new(Semaphore::new(batch_workers.max(1))),
        }
    }

    /// Scan a folder (non-recursive) for processable media files.
    ///
    /// Every file is probed so the UI can show durations up front; files
    /// ffprobe rejects are listed without metadata rather than dropped.
    pub async fn scan(&self, folder: &Path) -> Result<(String, Vec<BatchItem>), QueueError> {
        if !folder.is_dir() {
            return Err(QueueError::NotFound(folder.display().to_string()));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && is_media_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let metadata = match self.tools.probe(&path).await {
                Ok(probe) => Some(probe),
                Err(e) => {
                    debug!(path = %path.display(), "probe failed during scan: {e}");
                    None
                }
            };
            items.push(BatchItem {
                batch_id: batch_id.clone(),
                file_id: uuid::Uuid::new_v4().to_string(),
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path,
                selected: true,
                status: BatchItemStatus::Pending,
                progress: 0,
                child_job_id: None,
                metadata,
            });
        }

        info!(batch = %batch_id, files = items.len(), "folder scan complete");
        self.batches
            .write()
            .await
            .insert(batch_id.clone(), items.clone());
        Ok((batch_id, items))
    }

    /// Start every selected Pending item.
    ///
    /// Each item gets a worker task that waits for a batch slot, submits
    /// one separation job, and holds the slot until that job is terminal,
    /// so at most `batch_workers` batch separations exist at once.
    pub async fn process(
        &self,
        batch_id: &str,
        model: ModelSelection,
    ) -> Result<Vec<BatchItem>, QueueError> {
        let targets: Vec<(String, PathBuf)> = {
            let mut batches = self.batches.write().await;
            let items = batches
                .get_mut(batch_id)
                .ok_or_else(|| QueueError::NotFound(batch_id.to_string()))?;

            let mut targets = Vec::new();
            for item in items.iter_mut() {
                if item.selected && item.status == BatchItemStatus::Pending {
                    item.status = BatchItemStatus::Processing;
                    targets.push((item.file_id.clone(), item.path.clone()));
                }
            }
            targets
        };

        for (file_id, path) in targets {
            self.spawn_worker(batch_id.to_string(), file_id, path, model);
        }

        let batches = self.batches.read().await;
        Ok(batches
            .get(batch_id)
            .cloned()
            .unwrap_or_default())
    }

    fn spawn_worker(&self, batch_id: String, file_id: String, path: PathBuf, model: ModelSelection) {
        let pipeline = Arc::clone(&self.pipeline);
        let batches = Arc::clone(&self.batches);
        let slots = Arc::clone(&self.batch_slots);

        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };

            let submitted = pipeline
                .submit_separation(
                    path,
                    SeparationOptions {
                        model,
                        ..Default::default()
                    },
                )
                .await;

            let job_id = {
                let mut map = batches.write().await;
                let Some(items) = map.get_mut(&batch_id) else {
                    return;
                };
                let Some(item) = items.iter_mut().find(|i| i.file_id == file_id) else {
                    return;
                };
                match submitted {
                    Ok(job_id) => {
                        item.child_job_id = Some(job_id.clone());
                        Some(job_id)
                    }
                    Err(e) => {
                        debug!(file = %item.path.display(), "batch submission failed: {e}");
                        item.status = BatchItemStatus::Failed;
                        None
                    }
                }
            };

            // Hold the batch slot for the child job's whole lifetime.
            let Some(job_id) = job_id else {
                return;
            };
            loop {
                tokio::time::sleep(CHILD_POLL_INTERVAL).await;
                match pipeline.status(&job_id).await {
                    None => break,
                    Some(snapshot)
                        if matches!(
                            snapshot.status.as_str(),
                            "completed" | "failed" | "cancelled"
                        ) =>
                    {
                        break
                    }
                    _ => {}
                }
            }
        });
    }

    /// Drop an unprocessed item from a batch.
    pub async fn remove(
        &self,
        batch_id: &str,
        file_id: &str,
    ) -> Result<Vec<BatchItem>, QueueError> {
        let mut batches = self.batches.write().await;
        let items = batches
            .get_mut(batch_id)
            .ok_or_else(|| QueueError::NotFound(batch_id.to_string()))?;

        let Some(pos) = items.iter().position(|i| i.file_id == file_id) else {
            return Err(QueueError::NotFound(file_id.to_string()));
        };
        if items[pos].status != BatchItemStatus::Pending {
            return Err(QueueError::InvalidState {
                id: file_id.to_string(),
                status: format!("{:?}", items[pos].status).to_lowercase(),
                operation: "remove".to_string(),
            });
        }
        items.remove(pos);
        Ok(items.clone())
    }

    /// Current batch state, refreshed from the child jobs' snapshots.
    ///
    /// Items still waiting for a batch slot have no child job yet and stay
    /// Processing at 0%.
    pub async fn status(&self, batch_id: &str) -> Result<BatchStatus, QueueError> {
        let mut batches = self.batches.write().await;
        let items = batches
            .get_mut(batch_id)
            .ok_or_else(|| QueueError::NotFound(batch_id.to_string()))?;

        for item in items.iter_mut() {
            let Some(job_id) = &item.child_job_id else {
                continue;
            };
            if let Some(snapshot) = self.pipeline.status(job_id).await {
                item.progress = snapshot.progress;
                item.status = match snapshot.status.as_str() {
                    "completed" => BatchItemStatus::Completed,
                    "failed" | "cancelled" | "error" => BatchItemStatus::Failed,
                    _ => BatchItemStatus::Processing,
                };
            }
        }

        let total_files = items.len();
        let success = items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Completed)
            .count();
        let failed = items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Failed)
            .count();

        Ok(BatchStatus {
            total_files,
            processed: success + failed,
            success,
            failed,
            files: items.clone(),
        })
    }
}
