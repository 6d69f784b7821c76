use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nomusic_core::{
    load_config_or_default, validate_config, BatchManager, DemucsDriver, DownloadQueue,
    LibraryStore, MediaToolkit, MediaTools, SeparationPipeline, SpleeterDriver, ToolKind,
    ToolLocator, YtDlpDownloader,
};
use nomusic_core::preset::PresetStore;

use nomusic_server::api::create_router;
use nomusic_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("NOMUSIC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    validate_config(&config).context("Configuration validation failed")?;

    // Tools must exist before anything else runs.
    let locator = ToolLocator::new(config.tools.clone());
    locator
        .ensure_all()
        .await
        .context("External tool setup failed")?;

    let tools: Arc<dyn MediaToolkit> = Arc::new(
        MediaTools::from_locator(&locator)
            .await
            .context("ffmpeg setup failed")?,
    );

    let presets = Arc::new(PresetStore::load(config.storage.preset_file.clone()).await);
    let library = Arc::new(LibraryStore::load(config.storage.library_file.clone()).await);

    // video.json's processing section can override the configured segment
    // worker count, as it always has.
    let mut separator_config = config.separator.clone();
    separator_config.demucs_workers = presets.demucs_workers().await;

    let spleeter = Arc::new(SpleeterDriver::new(
        Arc::clone(&tools),
        separator_config.clone(),
    ));
    let demucs = Arc::new(DemucsDriver::new(Arc::clone(&tools), separator_config));

    let ytdlp_path = locator
        .locate(ToolKind::YtDlp)
        .await
        .context("yt-dlp setup failed")?;
    let downloader = Arc::new(YtDlpDownloader::new(ytdlp_path, config.downloader.clone()));

    let pipeline = SeparationPipeline::new(
        config.pipeline.clone(),
        config.storage.clone(),
        config.align.clone(),
        Arc::clone(&tools),
        spleeter,
        demucs,
        Arc::clone(&downloader) as _,
        Arc::clone(&presets),
        Arc::clone(&library),
        config.queue.download_workers,
    );

    let queue = DownloadQueue::load(
        config.storage.queue_file.clone(),
        config.queue.clone(),
        Arc::clone(&pipeline),
    )
    .await;

    let batches = Arc::new(BatchManager::new(
        Arc::clone(&pipeline),
        Arc::clone(&tools),
        config.queue.batch_workers,
    ));

    let state = Arc::new(AppState::new(
        config.clone(),
        pipeline,
        queue,
        batches,
        library,
        presets,
        downloader,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
