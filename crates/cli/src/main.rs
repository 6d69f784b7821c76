//! CLI mirror of the HTTP API: separate files/folders and download media
//! without the server.
//!
//! Exit codes: 0 success, 1 fatal error, 2 usage error (clap), 130 cancelled.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use nomusic_core::pipeline::{JobSnapshot, ModelSelection, SeparationOptions, SeparationPipeline};
use nomusic_core::preset::PresetStore;
use nomusic_core::{
    load_config_or_default, validate_config, Config, DemucsDriver, DownloadRequest, FormatKind,
    LibraryStore, MediaToolkit, MediaTools, SpleeterDriver, ToolKind, ToolLocator,
    YtDlpDownloader,
};
use nomusic_core::media::is_media_file;

const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "nomusic", about = "Vocal separation for local media", version)]
struct Cli {
    /// Config file (falls back to built-in defaults when absent).
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Separate vocals from a file or every media file in a folder.
    Separate {
        /// Input file.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Input folder (non-recursive).
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Which separators to run.
        #[arg(long, default_value = "both")]
        model: ModelSelection,
        /// Process only the first N seconds.
        #[arg(long)]
        duration: Option<f64>,
        /// Keep per-job temp directories.
        #[arg(long)]
        keep_temp: bool,
    },
    /// Download a video from a URL.
    Download {
        url: String,
        /// Optional output filename.
        filename: Option<String>,
        /// Separate vocals after the download finishes.
        #[arg(long)]
        separate: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config_or_default(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("configuration validation failed")?;

    let runtime = Runtime::build(&config).await?;

    match cli.command {
        Command::Separate {
            file,
            folder,
            model,
            duration,
            keep_temp,
        } => {
            let options = SeparationOptions {
                model,
                duration_limit: duration,
                keep_temp,
                language_preference: None,
            };

            let inputs = match (file, folder) {
                (Some(file), None) => vec![file],
                (None, Some(folder)) => scan_folder(&folder)?,
                _ => unreachable!("clap enforces exactly one of --file/--folder"),
            };

            if inputs.is_empty() {
                bail!("no media files to process");
            }

            let mut failures = 0usize;
            for input in inputs {
                println!("Processing {}", input.display());
                match runtime.separate(input, options.clone()).await? {
                    Outcome::Completed(snapshot) => {
                        println!("  -> {}", snapshot.result_files[0]);
                    }
                    Outcome::Failed(snapshot) => {
                        failures += 1;
                        eprintln!(
                            "  failed: {}",
                            snapshot.error.unwrap_or_else(|| "unknown error".into())
                        );
                    }
                    Outcome::Cancelled => {
                        eprintln!("cancelled");
                        return Ok(ExitCode::from(EXIT_CANCELLED));
                    }
                }
            }

            if failures > 0 {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Download {
            url,
            filename,
            separate,
        } => {
            let request = DownloadRequest {
                url,
                format_kind: FormatKind::Video,
                format_id: None,
                subtitles: None,
                filename,
            };

            match runtime.download(request).await? {
                Outcome::Completed(snapshot) => {
                    let file = snapshot.result_files[0].clone();
                    println!("Downloaded to {file}");
                    if separate {
                        println!("Starting vocal separation...");
                        match runtime
                            .separate(PathBuf::from(&file), SeparationOptions::default())
                            .await?
                        {
                            Outcome::Completed(snapshot) => {
                                println!("  -> {}", snapshot.result_files[0]);
                                Ok(ExitCode::SUCCESS)
                            }
                            Outcome::Failed(snapshot) => {
                                eprintln!(
                                    "separation failed: {}",
                                    snapshot.error.unwrap_or_else(|| "unknown error".into())
                                );
                                Ok(ExitCode::from(1))
                            }
                            Outcome::Cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
                        }
                    } else {
                        Ok(ExitCode::SUCCESS)
                    }
                }
                Outcome::Failed(snapshot) => {
                    eprintln!(
                        "download failed: {}",
                        snapshot.error.unwrap_or_else(|| "unknown error".into())
                    );
                    Ok(ExitCode::from(1))
                }
                Outcome::Cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
            }
        }
    }
}

enum Outcome {
    Completed(JobSnapshot),
    Failed(JobSnapshot),
    Cancelled,
}

/// The assembled core stack.
struct Runtime {
    pipeline: Arc<SeparationPipeline>,
}

impl Runtime {
    async fn build(config: &Config) -> Result<Self> {
        let locator = ToolLocator::new(config.tools.clone());
        locator
            .ensure_all()
            .await
            .context("external tool setup failed")?;

        let tools: Arc<dyn MediaToolkit> =
            Arc::new(MediaTools::from_locator(&locator).await?);

        let presets = Arc::new(PresetStore::load(config.storage.preset_file.clone()).await);
        let library = Arc::new(LibraryStore::load(config.storage.library_file.clone()).await);

        let mut separator_config = config.separator.clone();
        separator_config.demucs_workers = presets.demucs_workers().await;

        let spleeter = Arc::new(SpleeterDriver::new(
            Arc::clone(&tools),
            separator_config.clone(),
        ));
        let demucs = Arc::new(DemucsDriver::new(Arc::clone(&tools), separator_config));

        let ytdlp = locator.locate(ToolKind::YtDlp).await?;
        let downloader = Arc::new(YtDlpDownloader::new(ytdlp, config.downloader.clone()));

        let pipeline = SeparationPipeline::new(
            config.pipeline.clone(),
            config.storage.clone(),
            config.align.clone(),
            tools,
            spleeter,
            demucs,
            downloader,
            presets,
            library,
            config.queue.download_workers,
        );

        Ok(Self { pipeline })
    }

    async fn separate(&self, input: PathBuf, options: SeparationOptions) -> Result<Outcome> {
        let job_id = self.pipeline.submit_separation(input, options).await?;
        self.follow(&job_id).await
    }

    async fn download(&self, request: DownloadRequest) -> Result<Outcome> {
        let job_id = self.pipeline.submit_download(request).await;
        self.follow(&job_id).await
    }

    /// Poll a job to its terminal state, printing step changes, and map
    /// Ctrl-C onto a pipeline cancel.
    async fn follow(&self, job_id: &str) -> Result<Outcome> {
        let mut last_step = String::new();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, cancelling job");
                    let _ = self.pipeline.cancel(job_id).await;
                }
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }

            let Some(snapshot) = self.pipeline.status(job_id).await else {
                bail!("job disappeared");
            };

            if snapshot.current_step != last_step {
                println!("  [{:>3}%] {}", snapshot.progress, snapshot.current_step);
                last_step = snapshot.current_step.clone();
            }

            match snapshot.status.as_str() {
                "completed" => return Ok(Outcome::Completed(snapshot)),
                "failed" => return Ok(Outcome::Failed(snapshot)),
                "cancelled" => return Ok(Outcome::Cancelled),
                _ => {}
            }
        }
    }
}

/// Non-recursive folder listing, same rule as the batch scanner.
fn scan_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        bail!("not a folder: {}", folder.display());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_media_file(path))
        .collect();
    files.sort();
    Ok(files)
}
