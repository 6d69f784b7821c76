//! Folder batch queue integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use nomusic_core::align::AlignConfig;
use nomusic_core::config::StorageConfig;
use nomusic_core::library::LibraryStore;
use nomusic_core::pipeline::{
    JobFilter, JobKind, ModelSelection, PipelineConfig, SeparationPipeline,
};
use nomusic_core::preset::PresetStore;
use nomusic_core::queue::{BatchItemStatus, BatchManager, QueueError};
use nomusic_core::testing::{MockDownloader, MockMediaToolkit, MockSeparator};

struct TestHarness {
    batches: BatchManager,
    pipeline: Arc<SeparationPipeline>,
    spleeter: Arc<MockSeparator>,
    temp: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_batch_workers(2).await
    }

    async fn with_batch_workers(batch_workers: usize) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path();
        let storage = StorageConfig {
            output_dir: root.join("nomusic"),
            download_dir: root.join("download"),
            upload_dir: root.join("uploads"),
            work_dir: root.join("work"),
            queue_file: root.join("download_queue.json"),
            library_file: root.join("library.json"),
            preset_file: root.join("video.json"),
        };

        let media = Arc::new(MockMediaToolkit::new());
        let spleeter = MockSeparator::new("spleeter");
        let demucs = MockSeparator::new("demucs");
        let pipeline = SeparationPipeline::new(
            PipelineConfig {
                separation_workers: 2,
                ..Default::default()
            },
            storage.clone(),
            AlignConfig::default(),
            Arc::clone(&media) as _,
            Arc::clone(&spleeter) as _,
            demucs as _,
            Arc::new(MockDownloader::new()) as _,
            Arc::new(PresetStore::load(storage.preset_file.clone()).await),
            Arc::new(LibraryStore::load(storage.library_file.clone()).await),
            1,
        );

        let batches = BatchManager::new(Arc::clone(&pipeline), media as _, batch_workers);
        Self {
            batches,
            pipeline,
            spleeter,
            temp,
        }
    }

    fn populate_folder(&self) -> std::path::PathBuf {
        let folder = self.temp.path().join("inbox");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        std::fs::write(folder.join("b-side.mp3"), b"x").unwrap();
        std::fs::write(folder.join("a-movie.mp4"), b"x").unwrap();
        std::fs::write(folder.join("notes.txt"), b"x").unwrap();
        // Nested media must be ignored: the scan is non-recursive.
        std::fs::write(folder.join("nested").join("hidden.mp3"), b"x").unwrap();
        folder
    }

    async fn wait_batch_done(&self, batch_id: &str) -> nomusic_core::BatchStatus {
        for _ in 0..1000 {
            let status = self.batches.status(batch_id).await.unwrap();
            if status.processed == status.total_files {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {batch_id} never finished");
    }
}

#[tokio::test]
async fn test_scan_is_non_recursive_and_filters_media() {
    let harness = TestHarness::new().await;
    let folder = harness.populate_folder();

    let (batch_id, items) = harness.batches.scan(&folder).await.unwrap();
    assert!(!batch_id.is_empty());
    assert_eq!(items.len(), 2);
    // Scan order is deterministic (sorted by path).
    assert_eq!(items[0].file_name, "a-movie.mp4");
    assert_eq!(items[1].file_name, "b-side.mp3");
    assert!(items.iter().all(|i| i.selected));
    assert!(items.iter().all(|i| i.status == BatchItemStatus::Pending));
    assert!(items.iter().all(|i| i.metadata.is_some()));
}

#[tokio::test]
async fn test_scan_missing_folder_fails() {
    let harness = TestHarness::new().await;
    let err = harness
        .batches
        .scan(Path::new("/definitely/not/a/folder"))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}

#[tokio::test]
async fn test_process_runs_selected_items_to_completion() {
    let harness = TestHarness::new().await;
    let folder = harness.populate_folder();
    let (batch_id, _) = harness.batches.scan(&folder).await.unwrap();

    let items = harness
        .batches
        .process(&batch_id, ModelSelection::Spleeter)
        .await
        .unwrap();
    // Items are marked Processing immediately; child jobs appear as batch
    // slots free up.
    assert!(items
        .iter()
        .all(|i| i.status == BatchItemStatus::Processing));

    let status = harness.wait_batch_done(&batch_id).await;
    assert_eq!(status.total_files, 2);
    assert_eq!(status.success, 2);
    assert_eq!(status.failed, 0);
    assert!(status
        .files
        .iter()
        .all(|i| i.progress == 100 && i.status == BatchItemStatus::Completed));
    assert_eq!(harness.spleeter.call_count().await, 2);
}

#[tokio::test]
async fn test_batch_workers_bounds_concurrent_children() {
    // One batch slot, but a separation pool of two: the batch limiter must
    // be the one holding the second file back.
    let harness = TestHarness::with_batch_workers(1).await;
    harness.spleeter.set_delay(Duration::from_millis(300)).await;
    let folder = harness.populate_folder();
    let (batch_id, _) = harness.batches.scan(&folder).await.unwrap();

    harness
        .batches
        .process(&batch_id, ModelSelection::Spleeter)
        .await
        .unwrap();

    let filter = JobFilter {
        kind: Some(JobKind::Separate),
        status: Some("processing".to_string()),
    };
    let mut max_active = 0usize;
    for _ in 0..1000 {
        let active = harness.pipeline.list(&filter).await.len();
        max_active = max_active.max(active);
        let status = harness.batches.status(&batch_id).await.unwrap();
        if status.processed == status.total_files {
            assert_eq!(status.success, 2);
            assert!(max_active <= 1, "saw {max_active} concurrent batch jobs");
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch never finished");
}

#[tokio::test]
async fn test_remove_pending_item_only() {
    let harness = TestHarness::new().await;
    let folder = harness.populate_folder();
    let (batch_id, items) = harness.batches.scan(&folder).await.unwrap();

    let removed = harness
        .batches
        .remove(&batch_id, &items[0].file_id)
        .await
        .unwrap();
    assert_eq!(removed.len(), 1);

    harness
        .batches
        .process(&batch_id, ModelSelection::Both)
        .await
        .unwrap();
    let status = harness.batches.status(&batch_id).await.unwrap();
    let busy = &status.files[0];
    let err = harness
        .batches
        .remove(&batch_id, &busy.file_id)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidState { .. }));
}

#[tokio::test]
async fn test_unknown_batch_operations_fail() {
    let harness = TestHarness::new().await;
    assert!(matches!(
        harness.batches.status("nope").await.unwrap_err(),
        QueueError::NotFound(_)
    ));
    assert!(matches!(
        harness
            .batches
            .process("nope", ModelSelection::Both)
            .await
            .unwrap_err(),
        QueueError::NotFound(_)
    ));
}
