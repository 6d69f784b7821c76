//! Persistent FIFO download queue.
//!
//! Items are claimed in insertion order by a dispatcher task and handed to
//! worker tasks; each consumed item becomes a download job on the
//! pipeline. In-flight items are bounded by `download_workers` (default
//! one at a time). The queue file is rewritten atomically after every
//! mutation, so the on-disk state always matches memory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::jsonstore::{load_json, save_json_atomic};
use crate::pipeline::{SeparationOptions, SeparationPipeline};

use super::config::QueueConfig;
use super::types::{QueueAddRequest, QueueItem, QueueItemStatus, QueueSnapshot};
use super::QueueError;

/// How often the dispatcher samples the active job's progress.
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct DownloadQueue {
    path: PathBuf,
    config: QueueConfig,
    pipeline: Arc<SeparationPipeline>,
    items: RwLock<Vec<QueueItem>>,
    running: AtomicBool,
    dispatcher_alive: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    /// Bounds concurrent in-flight items; sized by `download_workers`.
    worker_slots: Arc<Semaphore>,
}

impl DownloadQueue {
    /// Load the queue file and resume dispatching if the process died
    /// mid-download (any item left in `Downloading` re-queues as Pending).
    pub async fn load(
        path: PathBuf,
        config: QueueConfig,
        pipeline: Arc<SeparationPipeline>,
    ) -> Arc<Self> {
        let mut items = match load_json::<Vec<QueueItem>>(&path).await {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), "corrupt queue file ({e}), starting fresh");
                Vec::new()
            }
        };

        let was_running = items
            .iter()
            .any(|i| i.status == QueueItemStatus::Downloading);
        for item in items.iter_mut() {
            if item.status == QueueItemStatus::Downloading {
                item.status = QueueItemStatus::Pending;
                item.progress = 0;
            }
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let worker_slots = Arc::new(Semaphore::new(config.download_workers.max(1)));
        let queue = Arc::new(Self {
            path,
            config,
            pipeline,
            items: RwLock::new(items),
            running: AtomicBool::new(false),
            dispatcher_alive: AtomicBool::new(false),
            shutdown_tx,
            worker_slots,
        });

        if was_running {
            info!("download queue was active at shutdown, resuming");
            queue.start();
        }

        queue
    }

    pub async fn add(&self, request: QueueAddRequest) -> String {
        let item = request.into_item();
        let queue_id = item.queue_id.clone();
        {
            let mut items = self.items.write().await;
            items.push(item);
            self.persist(&items).await;
        }
        queue_id
    }

    pub async fn add_batch(&self, requests: Vec<QueueAddRequest>) -> usize {
        let mut items = self.items.write().await;
        let added = requests.len();
        for request in requests {
            items.push(request.into_item());
        }
        self.persist(&items).await;
        added
    }

    /// Remove a Pending item. Anything already picked up is immutable.
    pub async fn remove(&self, queue_id: &str) -> Result<(), QueueError> {
        let mut items = self.items.write().await;
        let Some(pos) = items.iter().position(|i| i.queue_id == queue_id) else {
            return Err(QueueError::NotFound(queue_id.to_string()));
        };
        if items[pos].status != QueueItemStatus::Pending {
            return Err(QueueError::InvalidState {
                id: queue_id.to_string(),
                status: format!("{:?}", items[pos].status).to_lowercase(),
                operation: "remove".to_string(),
            });
        }
        items.remove(pos);
        self.persist(&items).await;
        Ok(())
    }

    /// Drop Completed and Failed items.
    pub async fn clear_done(&self) {
        let mut items = self.items.write().await;
        items.retain(|i| {
            matches!(
                i.status,
                QueueItemStatus::Pending | QueueItemStatus::Downloading
            )
        });
        self.persist(&items).await;
    }

    /// Start the dispatcher. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.dispatcher_alive.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.dispatcher().await;
        });
    }

    /// Stop picking new items. The in-flight download, if any, finishes.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("download queue stopped");
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let items = self.items.read().await;
        QueueSnapshot {
            queue: items.clone(),
            processing: self.is_running(),
        }
    }

    async fn persist(&self, items: &[QueueItem]) {
        if let Err(e) = save_json_atomic(&self.path, &items.to_vec()).await {
            warn!("failed to persist download queue: {e}");
        }
    }

    async fn update_item<F: FnOnce(&mut QueueItem)>(&self, queue_id: &str, mutate: F) {
        let mut items = self.items.write().await;
        if let Some(item) = items.iter_mut().find(|i| i.queue_id == queue_id) {
            mutate(item);
            self.persist(&items).await;
        }
    }

    /// Claim the first Pending item: mark it Downloading, bump its attempt
    /// count, persist, and hand it to a worker. One critical section so two
    /// workers can never claim the same item.
    async fn claim_next(&self) -> Option<QueueItem> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.status == QueueItemStatus::Pending)?;
        item.status = QueueItemStatus::Downloading;
        item.attempt_count += 1;
        item.progress = 0;
        item.error = None;
        let claimed = item.clone();
        self.persist(&items).await;
        Some(claimed)
    }

    async fn dispatcher(self: Arc<Self>) {
        info!(
            workers = self.config.download_workers,
            "download queue dispatcher started"
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if !self.is_running() {
                break;
            }

            // Wait for a free worker slot before claiming the next item.
            let Ok(permit) = Arc::clone(&self.worker_slots).acquire_owned().await else {
                break;
            };

            // The queue may have been stopped while this task waited on a
            // slot; stop prevents the next pick.
            if !self.is_running() {
                drop(permit);
                break;
            }

            let Some(item) = self.claim_next().await else {
                drop(permit);
                // A shutdown signal only wakes the loop; the running flag
                // at the top decides whether it exits.
                tokio::select! {
                    _ = shutdown_rx.recv() => {}
                    _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                }
                continue;
            };

            // In-flight items keep running after a stop; only the next
            // claim is prevented.
            let queue = Arc::clone(&self);
            tokio::spawn(async move {
                queue.process_item(item).await;
                drop(permit);
            });
        }

        self.dispatcher_alive.store(false, Ordering::SeqCst);
        info!("download queue dispatcher stopped");
    }

    /// Run one claimed item to a terminal state, including retry/backoff.
    async fn process_item(&self, item: QueueItem) {
        let queue_id = item.queue_id.clone();
        let attempt = item.attempt_count;
        debug!(queue_id = %queue_id, attempt, "dispatching queue item");

        let job_id = self
            .pipeline
            .submit_download(item.to_download_request())
            .await;

        // Follow the job to a terminal state, mirroring progress.
        let final_snapshot = loop {
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
            let Some(snapshot) = self.pipeline.status(&job_id).await else {
                break None;
            };
            match snapshot.status.as_str() {
                "completed" | "failed" | "cancelled" => break Some(snapshot),
                _ => {
                    let progress = snapshot.progress;
                    self.update_item(&queue_id, |i| i.progress = progress).await;
                }
            }
        };

        match final_snapshot {
            Some(snapshot) if snapshot.status == "completed" => {
                self.update_item(&queue_id, |i| {
                    i.status = QueueItemStatus::Completed;
                    i.progress = 100;
                })
                .await;

                if item.auto_separate {
                    if let Some(file) = snapshot.result_files.first() {
                        info!(queue_id = %queue_id, file = %file, "auto-separating downloaded file");
                        let result = self
                            .pipeline
                            .submit_separation(PathBuf::from(file), SeparationOptions::default())
                            .await;
                        if let Err(e) = result {
                            warn!(queue_id = %queue_id, "auto-separate submission failed: {e}");
                        }
                    }
                }
            }
            Some(snapshot) => {
                let error = snapshot
                    .error
                    .unwrap_or_else(|| "download failed".to_string());
                let transient = error.starts_with("download_transient");

                if transient && attempt < self.config.max_attempts {
                    let backoff = self.config.backoff_base_secs * 2u64.pow(attempt - 1);
                    warn!(
                        queue_id = %queue_id,
                        attempt,
                        backoff_secs = backoff,
                        "transient failure, will retry"
                    );
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    self.update_item(&queue_id, |i| {
                        i.status = QueueItemStatus::Pending;
                        i.progress = 0;
                        i.error = Some(error);
                    })
                    .await;
                } else {
                    self.update_item(&queue_id, |i| {
                        i.status = QueueItemStatus::Failed;
                        i.error = Some(error);
                    })
                    .await;
                }
            }
            None => {
                self.update_item(&queue_id, |i| {
                    i.status = QueueItemStatus::Failed;
                    i.error = Some("download job disappeared".to_string());
                })
                .await;
            }
        }
    }
}
