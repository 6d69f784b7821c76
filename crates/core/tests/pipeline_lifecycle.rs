//! Separation pipeline integration tests with mocked media tools,
//! separators, and downloader:
//! - phase flow and terminal states
//! - single-separator degradation
//! - cancellation and temp-dir lifecycle
//! - snapshot/library consistency

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use nomusic_core::align::AlignConfig;
use nomusic_core::config::StorageConfig;
use nomusic_core::library::LibraryStore;
use nomusic_core::pipeline::{
    CancelOutcome, JobFilter, JobKind, JobSnapshot, ModelSelection, PipelineConfig, PipelineError,
    SeparationOptions, SeparationPipeline,
};
use nomusic_core::preset::PresetStore;
use nomusic_core::testing::{MockDownloader, MockMediaToolkit, MockSeparator};

struct TestHarness {
    pipeline: Arc<SeparationPipeline>,
    spleeter: Arc<MockSeparator>,
    demucs: Arc<MockSeparator>,
    downloader: Arc<MockDownloader>,
    media: Arc<MockMediaToolkit>,
    library: Arc<LibraryStore>,
    temp: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_config(PipelineConfig::default()).await
    }

    async fn with_config(config: PipelineConfig) -> Self {
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

        let spleeter = MockSeparator::new("spleeter");
        let demucs = MockSeparator::new("demucs");
        let downloader = Arc::new(MockDownloader::new());
        let media = Arc::new(MockMediaToolkit::new());
        let presets = Arc::new(PresetStore::load(storage.preset_file.clone()).await);
        let library = Arc::new(LibraryStore::load(storage.library_file.clone()).await);

        let pipeline = SeparationPipeline::new(
            config,
            storage,
            AlignConfig::default(),
            Arc::clone(&media) as _,
            Arc::clone(&spleeter) as _,
            Arc::clone(&demucs) as _,
            Arc::clone(&downloader) as _,
            presets,
            Arc::clone(&library),
            1,
        );

        Self {
            pipeline,
            spleeter,
            demucs,
            downloader,
            media,
            library,
            temp,
        }
    }

    fn create_input(&self, name: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, b"fake media content").expect("write input");
        path
    }

    fn work_dir(&self, job_id: &str) -> PathBuf {
        self.temp.path().join("work").join(job_id)
    }

    async fn wait_terminal(&self, job_id: &str) -> JobSnapshot {
        for _ in 0..500 {
            let snapshot = self
                .pipeline
                .status(job_id)
                .await
                .expect("job should exist");
            if matches!(
                snapshot.status.as_str(),
                "completed" | "failed" | "cancelled"
            ) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach a terminal state");
    }
}

#[tokio::test]
async fn test_both_models_complete_video_input() {
    let harness = TestHarness::new().await;
    let input = harness.create_input("clip.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "completed");
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.current_step, "Finished");
    assert!(snapshot.error.is_none());

    // Final file follows the nomusic-<stem>.<ext> convention and exists.
    let output = PathBuf::from(&snapshot.result_files[0]);
    assert!(output.exists());
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("nomusic-clip."));

    // Metadata was captured during the probe phase.
    assert!(snapshot.metadata.is_some());
    assert!(snapshot.metadata.as_ref().unwrap().is_video);

    // Both drivers ran once.
    assert_eq!(harness.spleeter.call_count().await, 1);
    assert_eq!(harness.demucs.call_count().await, 1);

    // Temp dir is gone after the terminal transition.
    assert!(!harness.work_dir(&job_id).exists());

    // The library recorded the completion.
    let records = harness.library.list().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id, job_id);
}

#[tokio::test]
async fn test_audio_input_keeps_audio_container() {
    let harness = TestHarness::new().await;
    let input = harness.create_input("mix.flac");

    let job_id = harness
        .pipeline
        .submit_separation(
            input,
            SeparationOptions {
                model: ModelSelection::Spleeter,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "completed");

    let output = PathBuf::from(&snapshot.result_files[0]);
    assert!(output.exists());
    assert_eq!(
        output.file_name().unwrap().to_string_lossy(),
        "nomusic-mix.flac"
    );

    // Demucs was never invoked on a spleeter-only run.
    assert_eq!(harness.demucs.call_count().await, 0);
}

#[tokio::test]
async fn test_one_separator_failure_degrades_gracefully() {
    let harness = TestHarness::new().await;
    harness.demucs.set_always_fail(true).await;
    let input = harness.create_input("song.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "completed", "error: {:?}", snapshot.error);
    assert!(PathBuf::from(&snapshot.result_files[0]).exists());

    let spleeter_runs = harness.spleeter.recorded().await;
    assert_eq!(spleeter_runs.len(), 1);
    assert!(spleeter_runs[0].success);
    let demucs_runs = harness.demucs.recorded().await;
    assert_eq!(demucs_runs.len(), 1);
    assert!(!demucs_runs[0].success);
}

#[tokio::test]
async fn test_both_separators_failing_fails_job() {
    let harness = TestHarness::new().await;
    harness.spleeter.set_always_fail(true).await;
    harness.demucs.set_always_fail(true).await;
    let input = harness.create_input("song.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "failed");
    let error = snapshot.error.unwrap();
    assert!(error.starts_with("separator_failed"), "{error}");

    // No output, temp dir cleaned up, nothing recorded.
    assert!(!harness.work_dir(&job_id).exists());
    assert!(harness.library.list().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_during_separation() {
    let harness = TestHarness::new().await;
    harness.spleeter.set_delay(Duration::from_secs(30)).await;
    harness.demucs.set_delay(Duration::from_secs(30)).await;
    let input = harness.create_input("song.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    // Wait until the job is inside the separate phase.
    for _ in 0..200 {
        let snapshot = harness.pipeline.status(&job_id).await.unwrap();
        if snapshot.progress >= 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        harness.pipeline.cancel(&job_id).await,
        CancelOutcome::Accepted
    );

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "cancelled");
    assert!(snapshot.result_files.is_empty());
    assert!(!harness.work_dir(&job_id).exists());

    // cancel after cancel reports terminal.
    assert_eq!(
        harness.pipeline.cancel(&job_id).await,
        CancelOutcome::AlreadyTerminal
    );
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let harness = TestHarness::new().await;
    assert_eq!(
        harness.pipeline.cancel("no-such-job").await,
        CancelOutcome::NotFound
    );
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected_at_submit() {
    let harness = TestHarness::new().await;

    let missing = harness.temp.path().join("missing.mp4");
    let err = harness
        .pipeline
        .submit_separation(missing, SeparationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput { .. }));

    let not_media = harness.create_input("notes.txt");
    let err = harness
        .pipeline
        .submit_separation(not_media, SeparationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_probe_failure_fails_job() {
    let harness = TestHarness::new().await;
    let input = harness.create_input("clip.mp4");
    harness
        .media
        .set_next_error(nomusic_core::media::MediaError::ProbeFailed {
            path: input.clone(),
            stderr_tail: "moov atom not found".to_string(),
        })
        .await;

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "failed");
    assert!(snapshot.error.unwrap().starts_with("probe_failed"));
}

#[tokio::test]
async fn test_keep_temp_option_preserves_work_dir() {
    let harness = TestHarness::new().await;
    let input = harness.create_input("clip.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(
            input,
            SeparationOptions {
                keep_temp: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "completed");
    assert!(harness.work_dir(&job_id).exists());
}

#[tokio::test]
async fn test_progress_is_monotonic_through_phases() {
    let harness = TestHarness::new().await;
    harness.spleeter.set_delay(Duration::from_millis(100)).await;
    harness.demucs.set_delay(Duration::from_millis(100)).await;
    let input = harness.create_input("clip.mp4");

    let job_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();

    let mut last = 0u8;
    loop {
        let snapshot = harness.pipeline.status(&job_id).await.unwrap();
        assert!(
            snapshot.progress >= last,
            "progress regressed: {} -> {}",
            last,
            snapshot.progress
        );
        last = snapshot.progress;
        if matches!(
            snapshot.status.as_str(),
            "completed" | "failed" | "cancelled"
        ) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last, 100);
}

#[tokio::test]
async fn test_download_job_completes_and_records() {
    let harness = TestHarness::new().await;

    let job_id = harness
        .pipeline
        .submit_download(nomusic_core::DownloadRequest {
            url: "https://example.com/watch?v=1".to_string(),
            format_kind: nomusic_core::FormatKind::Video,
            format_id: None,
            subtitles: None,
            filename: None,
        })
        .await;

    let snapshot = harness.wait_terminal(&job_id).await;
    assert_eq!(snapshot.status, "completed");
    let path = PathBuf::from(&snapshot.result_files[0]);
    assert!(path.exists());
    assert!(path.starts_with(harness.temp.path().join("download")));
    assert_eq!(harness.downloader.call_count(), 1);

    let records = harness.library.list().await;
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_job_listing_by_kind() {
    let harness = TestHarness::new().await;
    let input = harness.create_input("clip.mp4");

    let sep_id = harness
        .pipeline
        .submit_separation(input, SeparationOptions::default())
        .await
        .unwrap();
    let dl_id = harness
        .pipeline
        .submit_download(nomusic_core::DownloadRequest {
            url: "https://example.com/v".to_string(),
            format_kind: nomusic_core::FormatKind::Audio,
            format_id: None,
            subtitles: None,
            filename: None,
        })
        .await;

    harness.wait_terminal(&sep_id).await;
    harness.wait_terminal(&dl_id).await;

    let separations = harness
        .pipeline
        .list(&JobFilter {
            kind: Some(JobKind::Separate),
            status: None,
        })
        .await;
    assert_eq!(separations.len(), 1);
    assert_eq!(separations[0].task_id, sep_id);

    let all = harness.pipeline.list(&JobFilter::default()).await;
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_separation_pool_serializes_jobs() {
    let harness = TestHarness::with_config(PipelineConfig {
        separation_workers: 1,
        ..Default::default()
    })
    .await;
    harness.spleeter.set_delay(Duration::from_millis(150)).await;
    harness.demucs.set_delay(Duration::from_millis(150)).await;

    let first = harness.create_input("one.mp4");
    let second = harness.create_input("two.mp4");

    let id1 = harness
        .pipeline
        .submit_separation(first, SeparationOptions::default())
        .await
        .unwrap();
    let id2 = harness
        .pipeline
        .submit_separation(second, SeparationOptions::default())
        .await
        .unwrap();

    let s1 = harness.wait_terminal(&id1).await;
    let s2 = harness.wait_terminal(&id2).await;
    assert_eq!(s1.status, "completed");
    assert_eq!(s2.status, "completed");
    assert_eq!(harness.spleeter.call_count().await, 2);
}
