use std::sync::Arc;

use nomusic_core::preset::PresetStore;
use nomusic_core::{
    BatchManager, Config, DownloadQueue, LibraryStore, MediaDownloader, SanitizedConfig,
    SeparationPipeline,
};

/// Shared application state
pub struct AppState {
    config: Config,
    pipeline: Arc<SeparationPipeline>,
    queue: Arc<DownloadQueue>,
    batches: Arc<BatchManager>,
    library: Arc<LibraryStore>,
    presets: Arc<PresetStore>,
    downloader: Arc<dyn MediaDownloader>,
}

impl AppState {
    pub fn new(
        config: Config,
        pipeline: Arc<SeparationPipeline>,
        queue: Arc<DownloadQueue>,
        batches: Arc<BatchManager>,
        library: Arc<LibraryStore>,
        presets: Arc<PresetStore>,
        downloader: Arc<dyn MediaDownloader>,
    ) -> Self {
        Self {
            config,
            pipeline,
            queue,
            batches,
            library,
            presets,
            downloader,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn pipeline(&self) -> &Arc<SeparationPipeline> {
        &self.pipeline
    }

    pub fn queue(&self) -> &Arc<DownloadQueue> {
        &self.queue
    }

    pub fn batches(&self) -> &Arc<BatchManager> {
        &self.batches
    }

    pub fn library(&self) -> &Arc<LibraryStore> {
        &self.library
    }

    #[allow(dead_code)]
    pub fn presets(&self) -> &Arc<PresetStore> {
        &self.presets
    }

    pub fn downloader(&self) -> &Arc<dyn MediaDownloader> {
        &self.downloader
    }
}
