//! Download queue integration tests:
//! - FIFO dispatch and persistence after every mutation
//! - retry/backoff on transient failures
//! - stop semantics and restart recovery
//! - auto-separate chaining

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use nomusic_core::align::AlignConfig;
use nomusic_core::config::StorageConfig;
use nomusic_core::library::LibraryStore;
use nomusic_core::pipeline::{JobFilter, JobKind, PipelineConfig, SeparationPipeline};
use nomusic_core::preset::PresetStore;
use nomusic_core::queue::{
    DownloadQueue, QueueAddRequest, QueueConfig, QueueError, QueueItem, QueueItemStatus,
};
use nomusic_core::testing::{MockDownloader, MockMediaToolkit, MockSeparator};
use nomusic_core::FormatKind;

struct TestHarness {
    queue: Arc<DownloadQueue>,
    pipeline: Arc<SeparationPipeline>,
    downloader: Arc<MockDownloader>,
    queue_file: PathBuf,
    _temp: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_queue_config(test_queue_config()).await
    }

    async fn with_queue_config(queue_config: QueueConfig) -> Self {
        let temp = TempDir::new().expect("temp dir");
        // The pipeline's download pool matches the queue width, as the
        // composition root wires it.
        let (pipeline, downloader, queue_file) =
            build_pipeline(temp.path(), queue_config.download_workers).await;
        let queue = DownloadQueue::load(
            queue_file.clone(),
            queue_config,
            Arc::clone(&pipeline),
        )
        .await;

        Self {
            queue,
            pipeline,
            downloader,
            queue_file,
            _temp: temp,
        }
    }

    fn add_request(url: &str) -> QueueAddRequest {
        serde_json::from_value(serde_json::json!({
            "url": url,
            "format": "video",
        }))
        .expect("valid request")
    }

    async fn on_disk(&self) -> Vec<QueueItem> {
        let bytes = tokio::fs::read(&self.queue_file).await.expect("queue file");
        serde_json::from_slice(&bytes).expect("valid queue json")
    }

    async fn wait_status(&self, queue_id: &str, status: QueueItemStatus) {
        for _ in 0..1000 {
            let snapshot = self.queue.snapshot().await;
            let item = snapshot
                .queue
                .iter()
                .find(|i| i.queue_id == queue_id)
                .expect("item exists");
            if item.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("item {queue_id} never reached {status:?}");
    }
}

fn test_queue_config() -> QueueConfig {
    QueueConfig {
        download_workers: 1,
        poll_interval_ms: 20,
        max_attempts: 3,
        backoff_base_secs: 0,
        ..Default::default()
    }
}

async fn build_pipeline(
    root: &Path,
    download_workers: usize,
) -> (Arc<SeparationPipeline>, Arc<MockDownloader>, PathBuf) {
    let storage = StorageConfig {
        output_dir: root.join("nomusic"),
        download_dir: root.join("download"),
        upload_dir: root.join("uploads"),
        work_dir: root.join("work"),
        queue_file: root.join("download_queue.json"),
        library_file: root.join("library.json"),
        preset_file: root.join("video.json"),
    };
    let queue_file = storage.queue_file.clone();

    let downloader = Arc::new(MockDownloader::new());
    let pipeline = SeparationPipeline::new(
        PipelineConfig::default(),
        storage.clone(),
        AlignConfig::default(),
        Arc::new(MockMediaToolkit::new()) as _,
        MockSeparator::new("spleeter") as _,
        MockSeparator::new("demucs") as _,
        Arc::clone(&downloader) as _,
        Arc::new(PresetStore::load(storage.preset_file.clone()).await),
        Arc::new(LibraryStore::load(storage.library_file.clone()).await),
        download_workers,
    );

    (pipeline, downloader, queue_file)
}

#[tokio::test]
async fn test_add_persists_atomically() {
    let harness = TestHarness::new().await;

    let id1 = harness.queue.add(TestHarness::add_request("http://v/1")).await;
    let id2 = harness.queue.add(TestHarness::add_request("http://v/2")).await;

    // On-disk state equals in-memory state after every mutation.
    let disk = harness.on_disk().await;
    let memory = harness.queue.snapshot().await.queue;
    assert_eq!(disk.len(), 2);
    assert_eq!(disk[0].queue_id, memory[0].queue_id);
    assert_eq!(disk[0].queue_id, id1);
    assert_eq!(disk[1].queue_id, id2);
    assert!(disk.iter().all(|i| i.status == QueueItemStatus::Pending));
    assert!(!harness.queue_file.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_remove_pending_only() {
    let harness = TestHarness::new().await;

    let id = harness.queue.add(TestHarness::add_request("http://v/1")).await;
    harness.queue.remove(&id).await.unwrap();
    assert!(harness.queue.snapshot().await.queue.is_empty());
    assert!(harness.on_disk().await.is_empty());

    let err = harness.queue.remove("missing").await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));

    // A consumed item is no longer removable.
    harness.downloader.set_delay(Duration::from_secs(5)).await;
    let busy = harness.queue.add(TestHarness::add_request("http://v/2")).await;
    harness.queue.start();
    harness.wait_status(&busy, QueueItemStatus::Downloading).await;
    let err = harness.queue.remove(&busy).await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidState { .. }));
    harness.queue.stop();
}

#[tokio::test]
async fn test_fifo_processing_order() {
    let harness = TestHarness::new().await;

    let first = harness.queue.add(TestHarness::add_request("http://v/first")).await;
    let second = harness.queue.add(TestHarness::add_request("http://v/second")).await;

    harness.queue.start();
    harness.wait_status(&first, QueueItemStatus::Completed).await;
    harness.wait_status(&second, QueueItemStatus::Completed).await;

    let urls = harness.downloader.requested_urls().await;
    assert_eq!(urls, vec!["http://v/first", "http://v/second"]);
}

#[tokio::test]
async fn test_download_workers_allows_concurrent_items() {
    let harness = TestHarness::with_queue_config(QueueConfig {
        download_workers: 2,
        poll_interval_ms: 20,
        max_attempts: 3,
        backoff_base_secs: 0,
        ..Default::default()
    })
    .await;
    harness.downloader.set_delay(Duration::from_millis(500)).await;

    let first = harness.queue.add(TestHarness::add_request("http://v/1")).await;
    let second = harness.queue.add(TestHarness::add_request("http://v/2")).await;
    harness.queue.start();

    // With two workers both items must be in flight at the same time.
    let mut saw_concurrent = false;
    for _ in 0..300 {
        let snapshot = harness.queue.snapshot().await;
        let downloading = snapshot
            .queue
            .iter()
            .filter(|i| i.status == QueueItemStatus::Downloading)
            .count();
        if downloading == 2 {
            saw_concurrent = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_concurrent, "both items should download concurrently");

    harness.wait_status(&first, QueueItemStatus::Completed).await;
    harness.wait_status(&second, QueueItemStatus::Completed).await;
}

#[tokio::test]
async fn test_transient_failures_retry_with_attempt_count() {
    let harness = TestHarness::new().await;
    harness.downloader.fail_first(2);

    let id = harness.queue.add(TestHarness::add_request("http://v/flaky")).await;
    harness.queue.start();
    harness.wait_status(&id, QueueItemStatus::Completed).await;

    let item = harness
        .queue
        .snapshot()
        .await
        .queue
        .into_iter()
        .find(|i| i.queue_id == id)
        .unwrap();
    assert_eq!(item.attempt_count, 3);
    assert_eq!(harness.downloader.call_count(), 3);
}

#[tokio::test]
async fn test_transient_failures_exhaust_attempts() {
    let harness = TestHarness::new().await;
    harness.downloader.fail_first(10);

    let id = harness.queue.add(TestHarness::add_request("http://v/dead")).await;
    harness.queue.start();
    harness.wait_status(&id, QueueItemStatus::Failed).await;

    let item = harness
        .queue
        .snapshot()
        .await
        .queue
        .into_iter()
        .find(|i| i.queue_id == id)
        .unwrap();
    assert_eq!(item.attempt_count, 3);
    assert!(item.error.is_some());
}

#[tokio::test]
async fn test_permanent_failure_does_not_retry() {
    let harness = TestHarness::new().await;
    harness.downloader.set_permanent_failure(true).await;

    let id = harness.queue.add(TestHarness::add_request("http://v/bad")).await;
    harness.queue.start();
    harness.wait_status(&id, QueueItemStatus::Failed).await;

    assert_eq!(harness.downloader.call_count(), 1);
}

#[tokio::test]
async fn test_failed_item_does_not_poison_queue() {
    let harness = TestHarness::new().await;
    harness.downloader.set_permanent_failure(true).await;

    let bad = harness.queue.add(TestHarness::add_request("http://v/bad")).await;
    harness.queue.start();
    harness.wait_status(&bad, QueueItemStatus::Failed).await;

    harness.downloader.set_permanent_failure(false).await;
    let good = harness.queue.add(TestHarness::add_request("http://v/good")).await;
    harness.wait_status(&good, QueueItemStatus::Completed).await;
}

#[tokio::test]
async fn test_clear_done_keeps_pending() {
    let harness = TestHarness::new().await;

    let done = harness.queue.add(TestHarness::add_request("http://v/1")).await;
    harness.queue.start();
    harness.wait_status(&done, QueueItemStatus::Completed).await;
    harness.queue.stop();

    let pending = harness.queue.add(TestHarness::add_request("http://v/2")).await;
    harness.queue.clear_done().await;

    let remaining = harness.queue.snapshot().await.queue;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].queue_id, pending);
    assert_eq!(harness.on_disk().await.len(), 1);
}

#[tokio::test]
async fn test_stop_prevents_next_pick_but_not_in_flight() {
    let harness = TestHarness::new().await;
    harness.downloader.set_delay(Duration::from_millis(300)).await;

    let first = harness.queue.add(TestHarness::add_request("http://v/1")).await;
    let second = harness.queue.add(TestHarness::add_request("http://v/2")).await;

    harness.queue.start();
    harness.wait_status(&first, QueueItemStatus::Downloading).await;
    harness.queue.stop();

    // In-flight item finishes.
    harness.wait_status(&first, QueueItemStatus::Completed).await;

    // Second item is never picked.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = harness.queue.snapshot().await;
    let second_item = snapshot.queue.iter().find(|i| i.queue_id == second).unwrap();
    assert_eq!(second_item.status, QueueItemStatus::Pending);
    assert!(!snapshot.processing);
}

#[tokio::test]
async fn test_restart_rehydrates_pending_in_order() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _downloader, queue_file) = build_pipeline(temp.path(), 1).await;

    // First process lifetime: enqueue three, never start.
    {
        let queue = DownloadQueue::load(
            queue_file.clone(),
            test_queue_config(),
            Arc::clone(&pipeline),
        )
        .await;
        queue.add(TestHarness::add_request("http://v/1")).await;
        queue.add(TestHarness::add_request("http://v/2")).await;
        queue.add(TestHarness::add_request("http://v/3")).await;
        assert!(!queue.is_running());
    }

    // "Restart": a fresh queue over the same file.
    let queue = DownloadQueue::load(queue_file, test_queue_config(), pipeline).await;
    let snapshot = queue.snapshot().await;
    assert_eq!(snapshot.queue.len(), 3);
    assert_eq!(snapshot.queue[0].url, "http://v/1");
    assert_eq!(snapshot.queue[2].url, "http://v/3");
    // Idle at shutdown means idle after restart.
    assert!(!snapshot.processing);
}

#[tokio::test]
async fn test_restart_resumes_interrupted_download() {
    let temp = TempDir::new().unwrap();
    let (pipeline, downloader, queue_file) = build_pipeline(temp.path(), 1).await;

    // Simulate a process that died mid-download: one item stuck in
    // Downloading on disk.
    let interrupted = serde_json::json!([
        {
            "queue_id": "q-1", "url": "http://v/resume", "format_kind": "video",
            "auto_separate": false, "status": "downloading",
            "progress": 40, "attempt_count": 1
        },
        {
            "queue_id": "q-2", "url": "http://v/next", "format_kind": "video",
            "auto_separate": false, "status": "pending",
            "progress": 0, "attempt_count": 0
        }
    ]);
    tokio::fs::write(&queue_file, interrupted.to_string())
        .await
        .unwrap();

    let queue = DownloadQueue::load(queue_file, test_queue_config(), pipeline).await;
    // Was running at shutdown → resumes automatically.
    assert!(queue.is_running());

    for _ in 0..1000 {
        let snapshot = queue.snapshot().await;
        if snapshot
            .queue
            .iter()
            .all(|i| i.status == QueueItemStatus::Completed)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let urls = downloader.requested_urls().await;
    assert_eq!(urls, vec!["http://v/resume", "http://v/next"]);

    // Preserved attempt count incremented on the resumed attempt.
    let snapshot = queue.snapshot().await;
    let resumed = snapshot.queue.iter().find(|i| i.queue_id == "q-1").unwrap();
    assert_eq!(resumed.attempt_count, 2);
}

#[tokio::test]
async fn test_auto_separate_submits_follow_up_job() {
    let harness = TestHarness::new().await;

    let request: QueueAddRequest = serde_json::from_value(serde_json::json!({
        "url": "http://v/song",
        "format": "video",
        "auto_separate": true,
    }))
    .unwrap();
    let id = harness.queue.add(request).await;
    harness.queue.start();
    harness.wait_status(&id, QueueItemStatus::Completed).await;

    // A separation job for the downloaded file eventually appears and
    // completes, leaving a nomusic output.
    let mut separation = None;
    for _ in 0..1000 {
        let jobs = harness
            .pipeline
            .list(&JobFilter {
                kind: Some(JobKind::Separate),
                status: None,
            })
            .await;
        if let Some(job) = jobs.first() {
            if job.status == "completed" {
                separation = Some(job.clone());
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let separation = separation.expect("auto-separate job should complete");
    let output = PathBuf::from(&separation.result_files[0]);
    assert!(output.exists());
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("nomusic-"));
}

#[tokio::test]
async fn test_add_batch() {
    let harness = TestHarness::new().await;
    let requests = vec![
        TestHarness::add_request("http://v/a"),
        TestHarness::add_request("http://v/b"),
        TestHarness::add_request("http://v/c"),
    ];
    let added = harness.queue.add_batch(requests).await;
    assert_eq!(added, 3);
    assert_eq!(harness.on_disk().await.len(), 3);
}

#[tokio::test]
async fn test_format_kind_alias_on_wire() {
    // The UI posts `format`; the queue stores `format_kind`.
    let item: QueueItem = serde_json::from_value(serde_json::json!({
        "queue_id": "q", "url": "u", "format_kind": "audio",
        "status": "pending"
    }))
    .unwrap();
    assert_eq!(item.format_kind, FormatKind::Audio);
}
