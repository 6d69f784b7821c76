//! Mock separator driver.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::align::write_wav;
use crate::cmd::CancelFlag;
use crate::separator::{Separator, SeparatorError, StepProgress};

use super::test_signal;

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedSeparation {
    pub wav_in: PathBuf,
    pub out_dir: PathBuf,
    pub success: bool,
}

/// Controllable [`Separator`]:
/// - inject a one-shot or permanent failure
/// - simulate work duration (cancellable)
/// - record invocations for assertions
/// - write a real vocal WAV so downstream phases operate on it
pub struct MockSeparator {
    name: &'static str,
    seed: u64,
    delay: RwLock<Duration>,
    next_error: Mutex<Option<SeparatorError>>,
    always_fail: RwLock<bool>,
    recorded: Arc<RwLock<Vec<RecordedSeparation>>>,
}

impl MockSeparator {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            seed: 77,
            delay: RwLock::new(Duration::from_millis(10)),
            next_error: Mutex::new(None),
            always_fail: RwLock::new(false),
            recorded: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    pub async fn set_next_error(&self, error: SeparatorError) {
        *self.next_error.lock().await = Some(error);
    }

    pub async fn set_always_fail(&self, fail: bool) {
        *self.always_fail.write().await = fail;
    }

    pub async fn recorded(&self) -> Vec<RecordedSeparation> {
        self.recorded.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.recorded.read().await.len()
    }

    fn failed(&self) -> SeparatorError {
        SeparatorError::Failed {
            which: self.name.to_string(),
            stderr_tail: "mock failure".to_string(),
        }
    }
}

#[async_trait]
impl Separator for MockSeparator {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn separate(
        &self,
        wav_in: &Path,
        out_dir: &Path,
        progress: mpsc::Sender<StepProgress>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, SeparatorError> {
        let record = |success: bool| {
            let recorded = Arc::clone(&self.recorded);
            let wav_in = wav_in.to_path_buf();
            let out_dir = out_dir.to_path_buf();
            async move {
                recorded.write().await.push(RecordedSeparation {
                    wav_in,
                    out_dir,
                    success,
                });
            }
        };

        if let Some(error) = self.next_error.lock().await.take() {
            record(false).await;
            return Err(error);
        }
        if *self.always_fail.read().await {
            record(false).await;
            return Err(self.failed());
        }

        let _ = progress
            .send(StepProgress::new(10.0, format!("{}: separating", self.name)))
            .await;

        let delay = *self.delay.read().await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                record(false).await;
                return Err(SeparatorError::Cancelled);
            }
        }

        tokio::fs::create_dir_all(out_dir).await?;
        let vocal = out_dir.join("vocals.wav");
        let buffer = test_signal(4000, 2, self.seed);
        write_wav(&vocal, &buffer).map_err(|e| SeparatorError::Failed {
            which: self.name.to_string(),
            stderr_tail: e.to_string(),
        })?;

        let _ = progress
            .send(StepProgress::new(100.0, format!("{}: complete", self.name)))
            .await;
        record(true).await;
        Ok(vocal)
    }
}
