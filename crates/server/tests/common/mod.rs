//! Common test utilities: an in-process server with mock dependencies.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use nomusic_core::align::AlignConfig;
use nomusic_core::config::{Config, StorageConfig};
use nomusic_core::library::LibraryStore;
use nomusic_core::pipeline::{PipelineConfig, SeparationPipeline};
use nomusic_core::preset::PresetStore;
use nomusic_core::queue::{DownloadQueue, QueueConfig};
use nomusic_core::testing::{MockDownloader, MockMediaToolkit, MockSeparator};
use nomusic_core::BatchManager;

use nomusic_server::api::create_router;
use nomusic_server::state::AppState;

/// In-process server with fully controllable mocks.
pub struct TestFixture {
    pub router: Router,
    pub pipeline: Arc<SeparationPipeline>,
    pub spleeter: Arc<MockSeparator>,
    pub demucs: Arc<MockSeparator>,
    pub downloader: Arc<MockDownloader>,
    pub media: Arc<MockMediaToolkit>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path();

        let storage = StorageConfig {
            output_dir: root.join("nomusic"),
            download_dir: root.join("download"),
            upload_dir: root.join("uploads"),
            work_dir: root.join("work"),
            queue_file: root.join("download_queue.json"),
            library_file: root.join("library.json"),
            preset_file: root.join("video.json"),
        };

        let mut config = Config::default();
        config.storage = storage.clone();

        let spleeter = MockSeparator::new("spleeter");
        let demucs = MockSeparator::new("demucs");
        let downloader = Arc::new(MockDownloader::new());
        let media = Arc::new(MockMediaToolkit::new());
        let presets = Arc::new(PresetStore::load(storage.preset_file.clone()).await);
        let library = Arc::new(LibraryStore::load(storage.library_file.clone()).await);

        let pipeline = SeparationPipeline::new(
            PipelineConfig::default(),
            storage.clone(),
            AlignConfig::default(),
            Arc::clone(&media) as _,
            Arc::clone(&spleeter) as _,
            Arc::clone(&demucs) as _,
            Arc::clone(&downloader) as _,
            Arc::clone(&presets),
            Arc::clone(&library),
            1,
        );

        let queue = DownloadQueue::load(
            storage.queue_file.clone(),
            QueueConfig {
                poll_interval_ms: 20,
                backoff_base_secs: 0,
                ..Default::default()
            },
            Arc::clone(&pipeline),
        )
        .await;

        let batches = Arc::new(BatchManager::new(
            Arc::clone(&pipeline),
            Arc::clone(&media) as _,
            2,
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&pipeline),
            queue,
            batches,
            library,
            presets,
            Arc::clone(&downloader) as _,
        ));

        Self {
            router: create_router(state),
            pipeline,
            spleeter,
            demucs,
            downloader,
            media,
            temp_dir,
        }
    }

    /// Stage a fake media file inside the fixture's temp dir.
    pub fn create_input(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, b"fake media content").expect("write input");
        path
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    /// Poll `/status/{job_id}` until the job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: &str) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/status/{job_id}")).await;
            assert_eq!(response.status, StatusCode::OK);
            let status = response.body["status"].as_str().unwrap_or_default();
            if matches!(status, "completed" | "failed" | "cancelled") {
                return response.body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }
}
