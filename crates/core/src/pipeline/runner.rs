//! The separation pipeline runner.
//!
//! Phase order and the progress budget each phase owns:
//!
//! | Phase     | Budget  |
//! |-----------|---------|
//! | Probe     | 0 → 3   |
//! | Extract   | 3 → 10  |
//! | Separate  | 10 → 75 |
//! | Align     | 75 → 80 |
//! | Mix       | 80 → 85 |
//! | Normalize | 85 → 92 |
//! | Remux     | 92 → 99 |
//! | Verify    | 100     |
//!
//! Phases are strictly sequential except the two separators inside
//! Separate, which run concurrently with the band split between them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::align::{align_files, mix_files, AlignConfig};
use crate::cmd::CancelFlag;
use crate::config::StorageConfig;
use crate::downloader::{DownloadRequest, MediaDownloader};
use crate::library::LibraryStore;
use crate::media::{
    is_media_file, select_primary_track, ExtractOptions, MediaToolkit, RemuxSettings,
};
use crate::preset::PresetStore;
use crate::separator::{Separator, StepProgress};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::job::{
    CancelOutcome, Job, JobFilter, JobId, JobKind, JobSnapshot, JobTable, ModelSelection,
    SeparationOptions,
};

/// A progress band inside the 0–100 job budget.
#[derive(Debug, Clone, Copy)]
struct Band {
    base: f32,
    span: f32,
}

impl Band {
    fn map(&self, local_pct: f32) -> f32 {
        self.base + self.span * (local_pct.clamp(0.0, 100.0) / 100.0)
    }
}

/// Vocal outputs of the Separate phase; at least one side is present.
struct SeparatedVocals {
    spleeter: Option<PathBuf>,
    demucs: Option<PathBuf>,
}

/// Runs separation and download jobs end to end.
pub struct SeparationPipeline {
    config: PipelineConfig,
    storage: StorageConfig,
    align_config: AlignConfig,
    tools: Arc<dyn MediaToolkit>,
    spleeter: Arc<dyn Separator>,
    demucs: Arc<dyn Separator>,
    downloader: Arc<dyn MediaDownloader>,
    presets: Arc<PresetStore>,
    library: Arc<LibraryStore>,
    jobs: Arc<JobTable>,
    separation_slots: Arc<Semaphore>,
    download_slots: Arc<Semaphore>,
}

impl SeparationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        storage: StorageConfig,
        align_config: AlignConfig,
        tools: Arc<dyn MediaToolkit>,
        spleeter: Arc<dyn Separator>,
        demucs: Arc<dyn Separator>,
        downloader: Arc<dyn MediaDownloader>,
        presets: Arc<PresetStore>,
        library: Arc<LibraryStore>,
        download_workers: usize,
    ) -> Arc<Self> {
        let separation_slots = Arc::new(Semaphore::new(config.separation_workers.max(1)));
        let download_slots = Arc::new(Semaphore::new(download_workers.max(1)));
        Arc::new(Self {
            config,
            storage,
            align_config,
            tools,
            spleeter,
            demucs,
            downloader,
            presets,
            library,
            jobs: Arc::new(JobTable::new()),
            separation_slots,
            download_slots,
        })
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    pub async fn status(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs.snapshot(job_id).await
    }

    pub async fn cancel(&self, job_id: &str) -> CancelOutcome {
        self.jobs.cancel(job_id).await
    }

    pub async fn list(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        self.jobs.list(filter).await
    }

    /// Queue a separation job. Non-blocking; returns immediately with the
    /// job id and lets the worker pool pick the job up.
    pub async fn submit_separation(
        self: &Arc<Self>,
        input: PathBuf,
        options: SeparationOptions,
    ) -> Result<JobId, PipelineError> {
        if !input.exists() {
            return Err(PipelineError::InvalidInput {
                path: input,
                reason: "file not found".to_string(),
            });
        }
        if !is_media_file(&input) {
            return Err(PipelineError::InvalidInput {
                path: input,
                reason: "unsupported file type".to_string(),
            });
        }

        let job = Job::new(JobKind::Separate, input.to_string_lossy().to_string());
        let id = self.jobs.insert(job).await;

        let this = Arc::clone(self);
        let job_id = id.clone();
        tokio::spawn(async move {
            this.run_separation_job(job_id, input, options).await;
        });

        Ok(id)
    }

    /// Queue a download job. Non-blocking.
    pub async fn submit_download(self: &Arc<Self>, request: DownloadRequest) -> JobId {
        let job = Job::new(JobKind::Download, request.url.clone());
        let id = self.jobs.insert(job).await;

        let this = Arc::clone(self);
        let job_id = id.clone();
        tokio::spawn(async move {
            this.run_download_job(job_id, request).await;
        });

        id
    }

    // ------------------------------------------------------------------
    // Separation
    // ------------------------------------------------------------------

    async fn run_separation_job(
        self: Arc<Self>,
        id: JobId,
        input: PathBuf,
        options: SeparationOptions,
    ) {
        let cancel = self
            .jobs
            .cancel_flag(&id)
            .await
            .unwrap_or_default();

        let Ok(_permit) = self.separation_slots.acquire().await else {
            self.jobs
                .mark_failed(&id, "internal", "worker pool closed".to_string())
                .await;
            return;
        };

        if cancel.is_cancelled() {
            self.jobs.mark_cancelled(&id).await;
            return;
        }

        self.jobs.mark_running(&id).await;
        let temp_dir = self.storage.work_dir.join(&id);

        let result = self
            .run_separation(&id, &input, &options, &temp_dir, &cancel)
            .await;

        match result {
            Ok(output) => {
                info!(job = %id, output = %output.display(), "separation complete");
                self.jobs.mark_completed(&id, vec![output]).await;
                if let Some(snapshot) = self.jobs.snapshot(&id).await {
                    if let Err(e) = self.library.record(&snapshot).await {
                        warn!(job = %id, "failed to record in library: {e}");
                    }
                }
            }
            Err(PipelineError::Cancelled) => {
                info!(job = %id, "separation cancelled");
                self.jobs.mark_cancelled(&id).await;
            }
            Err(e) => {
                warn!(job = %id, "separation failed: {e}");
                self.jobs.mark_failed(&id, e.kind(), e.to_string()).await;
            }
        }

        let keep_temp = options.keep_temp || self.config.keep_temp;
        if keep_temp {
            debug!(job = %id, dir = %temp_dir.display(), "keeping temp directory");
        } else if temp_dir.exists() {
            // Cleanup failure is logged, never promoted to a job failure.
            if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                warn!(job = %id, "temp cleanup failed: {e}");
            }
        }
    }

    async fn run_separation(
        &self,
        id: &JobId,
        input: &Path,
        options: &SeparationOptions,
        temp_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, PipelineError> {
        // Probe: 0 → 3
        self.jobs.set_step(id, 0.0, "Probing input").await;
        let probe = self.tools.probe(input).await?;
        if probe.audio_tracks.is_empty() {
            return Err(PipelineError::InvalidInput {
                path: input.to_path_buf(),
                reason: "no audio tracks".to_string(),
            });
        }
        self.jobs.set_metadata(id, probe.clone()).await;
        self.jobs.set_progress(id, 3.0).await;
        ensure_live(cancel)?;

        let extract_dir = temp_dir.join("extract");
        let mix_dir = temp_dir.join("mix");
        for dir in [
            &extract_dir,
            &temp_dir.join("spleeter"),
            &temp_dir.join("demucs"),
            &mix_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Extract: 3 → 10
        self.jobs.set_step(id, 3.0, "Extracting audio").await;
        let preference = options
            .language_preference
            .clone()
            .unwrap_or_else(|| self.config.language_preference.clone());
        let track_index = if probe.audio_tracks.len() > 1 {
            select_primary_track(&probe, &preference).map(|t| t.index)
        } else {
            None
        };

        let wav = extract_dir.join("audio.wav");
        let effective_duration = options
            .duration_limit
            .map(|limit| limit.min(probe.duration_s))
            .unwrap_or(probe.duration_s);
        let extract_progress = self.forward_band(id, Band { base: 3.0, span: 7.0 });
        self.tools
            .extract_wav(
                input,
                &wav,
                &ExtractOptions {
                    track_index,
                    duration_limit: options.duration_limit,
                },
                cancel,
                Some((effective_duration, extract_progress)),
            )
            .await?;
        self.jobs.set_progress(id, 10.0).await;
        ensure_live(cancel)?;

        // Separate: 10 → 75
        let vocals = self
            .run_separators(id, &wav, temp_dir, options.model, cancel)
            .await?;
        self.jobs.set_progress(id, 75.0).await;
        ensure_live(cancel)?;

        // Align + Mix: 75 → 85 (skipped on the single-driver path)
        let vocal = match (vocals.spleeter, vocals.demucs) {
            (Some(a), Some(b)) => {
                self.jobs.set_step(id, 75.0, "Aligning vocal tracks").await;
                let aligned_a = mix_dir.join("aligned_spleeter.wav");
                let aligned_b = mix_dir.join("aligned_demucs.wav");
                let align_config = self.align_config.clone();
                let (a2, b2) = (aligned_a.clone(), aligned_b.clone());
                let alignment = tokio::task::spawn_blocking(move || {
                    align_files(&a, &b, &a2, &b2, &align_config)
                })
                .await
                .map_err(join_error)?
                .map_err(PipelineError::Mix)?;

                if alignment.low_confidence {
                    self.jobs
                        .set_step(id, 78.0, "Alignment low confidence, keeping original timing")
                        .await;
                } else {
                    debug!(
                        job = %id,
                        lag_ms = alignment.lag_seconds * 1000.0,
                        confidence = alignment.confidence,
                        "alignment applied"
                    );
                }
                self.jobs.set_progress(id, 80.0).await;
                ensure_live(cancel)?;

                self.jobs.set_step(id, 80.0, "Mixing vocal tracks").await;
                let mixed = mix_dir.join("mixed.wav");
                let out = mixed.clone();
                tokio::task::spawn_blocking(move || mix_files(&aligned_a, &aligned_b, &out))
                    .await
                    .map_err(join_error)?
                    .map_err(PipelineError::Mix)?;
                self.jobs.set_progress(id, 85.0).await;
                mixed
            }
            (Some(vocal), None) | (None, Some(vocal)) => {
                self.jobs.set_progress(id, 85.0).await;
                vocal
            }
            (None, None) => unreachable!("run_separators guarantees at least one output"),
        };
        ensure_live(cancel)?;

        // Normalize: 85 → 92
        self.jobs.set_step(id, 85.0, "Normalizing loudness").await;
        let preset = self.presets.active().await;
        let vocals_aac = mix_dir.join("vocals.m4a");
        self.tools
            .loudness_normalize(
                &vocal,
                &vocals_aac,
                preset.audio.bitrate.as_deref(),
                cancel,
            )
            .await?;
        self.jobs.set_progress(id, 92.0).await;
        ensure_live(cancel)?;

        // Remux: 92 → 99
        self.jobs.set_step(id, 92.0, "Writing final output").await;
        tokio::fs::create_dir_all(&self.storage.output_dir).await?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        let output = if probe.is_video {
            let out = self
                .storage
                .output_dir
                .join(format!("nomusic-{stem}.{}", preset.output.format));
            self.tools
                .remux_video(
                    input,
                    &vocals_aac,
                    &out,
                    &RemuxSettings {
                        video_codec: preset.video.codec.clone(),
                        video_bitrate: preset.video.bitrate.clone(),
                        audio_codec: preset.audio.codec.clone(),
                        audio_bitrate: preset.audio.bitrate.clone(),
                        container: preset.output.format.clone(),
                    },
                    cancel,
                )
                .await?;
            out
        } else {
            let ext = match input
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .as_deref()
            {
                Some("flac") => "flac",
                Some("wav") => "wav",
                Some("m4a") => "m4a",
                _ => "mp3",
            };
            let out = self
                .storage
                .output_dir
                .join(format!("nomusic-{stem}.{ext}"));
            self.tools
                .encode_audio_final(&vocals_aac, &out, preset.audio.bitrate.as_deref(), cancel)
                .await?;
            out
        };
        self.jobs.set_progress(id, 99.0).await;

        // Verify
        let meta = tokio::fs::metadata(&output).await.map_err(|_| {
            PipelineError::Media(crate::media::MediaError::RemuxFailed {
                stderr_tail: "output file was not created".to_string(),
            })
        })?;
        if meta.len() == 0 {
            return Err(PipelineError::Media(crate::media::MediaError::RemuxFailed {
                stderr_tail: "output file is empty".to_string(),
            }));
        }

        Ok(output)
    }

    /// Run the selected separators; Spleeter maps onto the first half-band,
    /// Demucs onto the second, and a lone driver owns the whole band.
    async fn run_separators(
        &self,
        id: &JobId,
        wav: &Path,
        temp_dir: &Path,
        model: ModelSelection,
        cancel: &CancelFlag,
    ) -> Result<SeparatedVocals, PipelineError> {
        let full = Band {
            base: 10.0,
            span: 65.0,
        };

        match model {
            ModelSelection::Spleeter => {
                let vocal = self
                    .run_one_separator(&self.spleeter, id, wav, &temp_dir.join("spleeter"), full, cancel)
                    .await?;
                Ok(SeparatedVocals {
                    spleeter: Some(vocal),
                    demucs: None,
                })
            }
            ModelSelection::Demucs => {
                let vocal = self
                    .run_one_separator(&self.demucs, id, wav, &temp_dir.join("demucs"), full, cancel)
                    .await?;
                Ok(SeparatedVocals {
                    spleeter: None,
                    demucs: Some(vocal),
                })
            }
            ModelSelection::Both => {
                let first = Band {
                    base: 10.0,
                    span: 32.5,
                };
                let second = Band {
                    base: 42.5,
                    span: 32.5,
                };

                let spleeter_dir = temp_dir.join("spleeter");
                let demucs_dir = temp_dir.join("demucs");
                let (spleeter_result, demucs_result) = tokio::join!(
                    self.run_one_separator(
                        &self.spleeter,
                        id,
                        wav,
                        &spleeter_dir,
                        first,
                        cancel
                    ),
                    self.run_one_separator(
                        &self.demucs,
                        id,
                        wav,
                        &demucs_dir,
                        second,
                        cancel
                    ),
                );

                match (spleeter_result, demucs_result) {
                    (Ok(a), Ok(b)) => Ok(SeparatedVocals {
                        spleeter: Some(a),
                        demucs: Some(b),
                    }),
                    (Ok(a), Err(PipelineError::Cancelled))
                    | (Err(PipelineError::Cancelled), Ok(a)) => {
                        let _ = a;
                        Err(PipelineError::Cancelled)
                    }
                    (Ok(a), Err(e)) => {
                        warn!(job = %id, "demucs failed, continuing with spleeter: {e}");
                        self.jobs
                            .set_step(id, 75.0, "Demucs failed, continuing with Spleeter")
                            .await;
                        Ok(SeparatedVocals {
                            spleeter: Some(a),
                            demucs: None,
                        })
                    }
                    (Err(e), Ok(b)) => {
                        warn!(job = %id, "spleeter failed, continuing with demucs: {e}");
                        self.jobs
                            .set_step(id, 75.0, "Spleeter failed, continuing with Demucs")
                            .await;
                        Ok(SeparatedVocals {
                            spleeter: None,
                            demucs: Some(b),
                        })
                    }
                    (Err(ea), Err(eb)) => {
                        if matches!(ea, PipelineError::Cancelled)
                            || matches!(eb, PipelineError::Cancelled)
                        {
                            return Err(PipelineError::Cancelled);
                        }
                        Err(PipelineError::BothSeparatorsFailed {
                            spleeter: ea.to_string(),
                            demucs: eb.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn run_one_separator(
        &self,
        driver: &Arc<dyn Separator>,
        id: &JobId,
        wav: &Path,
        out_dir: &Path,
        band: Band,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, PipelineError> {
        let progress = self.forward_steps(id, band);
        let vocal = driver
            .separate(wav, out_dir, progress, cancel)
            .await?;
        self.jobs.set_progress(id, band.map(100.0)).await;
        Ok(vocal)
    }

    /// Channel that maps a driver's local percentages into a band.
    fn forward_band(&self, id: &JobId, band: Band) -> mpsc::Sender<f32> {
        let (tx, mut rx) = mpsc::channel::<f32>(64);
        let jobs = Arc::clone(&self.jobs);
        let id = id.clone();
        tokio::spawn(async move {
            while let Some(pct) = rx.recv().await {
                jobs.set_progress(&id, band.map(pct)).await;
            }
        });
        tx
    }

    /// Like [`forward_band`] but also carries step labels.
    fn forward_steps(&self, id: &JobId, band: Band) -> mpsc::Sender<StepProgress> {
        let (tx, mut rx) = mpsc::channel::<StepProgress>(64);
        let jobs = Arc::clone(&self.jobs);
        let id = id.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                jobs.set_step(&id, band.map(event.pct), event.step).await;
            }
        });
        tx
    }

    // ------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------

    async fn run_download_job(self: Arc<Self>, id: JobId, request: DownloadRequest) {
        let cancel = self.jobs.cancel_flag(&id).await.unwrap_or_default();

        let Ok(_permit) = self.download_slots.acquire().await else {
            self.jobs
                .mark_failed(&id, "internal", "worker pool closed".to_string())
                .await;
            return;
        };

        if cancel.is_cancelled() {
            self.jobs.mark_cancelled(&id).await;
            return;
        }

        self.jobs.mark_running(&id).await;
        self.jobs.set_step(&id, 0.0, "Starting download").await;

        let (tx, mut rx) = mpsc::channel::<f32>(64);
        {
            let jobs = Arc::clone(&self.jobs);
            let id = id.clone();
            tokio::spawn(async move {
                while let Some(pct) = rx.recv().await {
                    // Hold 100% back for the completion path.
                    jobs.set_step(
                        &id,
                        pct.min(99.0),
                        format!("Downloading: {pct:.1}%"),
                    )
                    .await;
                }
            });
        }

        let result = self
            .downloader
            .download(&request, &self.storage.download_dir, tx, &cancel)
            .await;

        match result {
            Ok(path) => {
                info!(job = %id, path = %path.display(), "download complete");
                if let Ok(metadata) = self.tools.probe(&path).await {
                    self.jobs.set_metadata(&id, metadata).await;
                }
                self.jobs.mark_completed(&id, vec![path]).await;
                if let Some(snapshot) = self.jobs.snapshot(&id).await {
                    if let Err(e) = self.library.record(&snapshot).await {
                        warn!(job = %id, "failed to record in library: {e}");
                    }
                }
            }
            Err(crate::downloader::DownloadError::Cancelled) => {
                self.jobs.mark_cancelled(&id).await;
            }
            Err(e) => {
                let err: PipelineError = e.into();
                self.jobs.mark_failed(&id, err.kind(), err.to_string()).await;
            }
        }
    }
}

fn ensure_live(cancel: &CancelFlag) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Io(std::io::Error::other(e))
}
