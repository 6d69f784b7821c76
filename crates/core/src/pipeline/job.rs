//! Job data model and the guarded job table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::cmd::CancelFlag;
use crate::media::MediaProbe;

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Separate,
    Download,
}

/// Job lifecycle. Transitions are monotonic:
/// Queued → Running → {Completed, Failed, Cancelled}; terminal is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// The wire names the UI polls on. `Running` reads as `processing`.
    pub fn api_name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Structured job error: stable kind plus human message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub message: String,
}

impl JobError {
    pub fn to_display(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

/// Which separators a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSelection {
    Spleeter,
    Demucs,
    Both,
}

impl Default for ModelSelection {
    fn default() -> Self {
        ModelSelection::Both
    }
}

impl FromStr for ModelSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spleeter" => Ok(ModelSelection::Spleeter),
            "demucs" => Ok(ModelSelection::Demucs),
            "both" => Ok(ModelSelection::Both),
            other => Err(format!("unknown model: {other}")),
        }
    }
}

/// Per-submission options for a separation job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparationOptions {
    #[serde(default)]
    pub model: ModelSelection,
    /// Process only the first N seconds.
    #[serde(default)]
    pub duration_limit: Option<f64>,
    /// Keep the temp directory for debugging.
    #[serde(default)]
    pub keep_temp: bool,
    /// Per-job audio-track language priority, overrides the configured one.
    #[serde(default)]
    pub language_preference: Option<Vec<String>>,
}

/// One tracked unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub input: String,
    pub state: JobState,
    pub progress: u8,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
    pub result_paths: Vec<PathBuf>,
    pub metadata: Option<MediaProbe>,
    pub error: Option<JobError>,
    pub cancel: CancelFlag,
}

impl Job {
    pub fn new(kind: JobKind, input: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            input,
            state: JobState::Queued,
            progress: 0,
            current_step: "queued".to_string(),
            created_at: Utc::now(),
            result_paths: Vec::new(),
            metadata: None,
            error: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Immutable wire view of a job. Field names are frozen for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub task_id: String,
    pub status: String,
    pub progress: u8,
    pub current_step: String,
    pub result_files: Vec<String>,
    pub metadata: Option<MediaProbe>,
    pub error: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            task_id: job.id.clone(),
            status: job.state.api_name().to_string(),
            progress: job.progress,
            current_step: job.current_step.clone(),
            result_files: job
                .result_paths
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
            metadata: job.metadata.clone(),
            error: job.error.as_ref().map(JobError::to_display),
        }
    }
}

/// Filter for [`JobTable::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub kind: Option<JobKind>,
    pub status: Option<String>,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Accepted,
    AlreadyTerminal,
    NotFound,
}

/// Guarded map of all jobs, keyed by id.
///
/// Reads return snapshot copies; mutations are short critical sections.
/// Progress is clamped to be monotonically non-decreasing and terminal
/// states are never overwritten.
#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) -> JobId {
        let id = job.id.clone();
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    pub async fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs.read().await.get(id).map(JobSnapshot::from)
    }

    pub async fn cancel_flag(&self, id: &str) -> Option<CancelFlag> {
        self.jobs.read().await.get(id).map(|j| j.cancel.clone())
    }

    pub async fn list(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        let jobs = self.jobs.read().await;
        let mut snapshots: Vec<(DateTime<Utc>, JobSnapshot)> = jobs
            .values()
            .filter(|job| filter.kind.map(|k| job.kind == k).unwrap_or(true))
            .filter(|job| {
                filter
                    .status
                    .as_deref()
                    .map(|s| job.state.api_name() == s)
                    .unwrap_or(true)
            })
            .map(|job| (job.created_at, JobSnapshot::from(job)))
            .collect();
        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        snapshots.into_iter().map(|(_, s)| s).collect()
    }

    /// Request cancellation. Terminal jobs reject with `AlreadyTerminal`.
    pub async fn cancel(&self, id: &str) -> CancelOutcome {
        let jobs = self.jobs.read().await;
        match jobs.get(id) {
            None => CancelOutcome::NotFound,
            Some(job) if job.state.is_terminal() => CancelOutcome::AlreadyTerminal,
            Some(job) => {
                job.cancel.cancel();
                CancelOutcome::Accepted
            }
        }
    }

    pub async fn mark_running(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state == JobState::Queued {
                job.state = JobState::Running;
            }
        }
    }

    /// Update progress (monotonic) and the current step label.
    pub async fn set_step(&self, id: &str, progress: f32, step: impl Into<String>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            let pct = progress.clamp(0.0, 100.0).round() as u8;
            job.progress = job.progress.max(pct);
            job.current_step = step.into();
        }
    }

    /// Update progress only, keeping the current step label.
    pub async fn set_progress(&self, id: &str, progress: f32) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            let pct = progress.clamp(0.0, 100.0).round() as u8;
            job.progress = job.progress.max(pct);
        }
    }

    pub async fn set_metadata(&self, id: &str, metadata: MediaProbe) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            job.metadata = Some(metadata);
        }
    }

    pub async fn mark_completed(&self, id: &str, result_paths: Vec<PathBuf>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            job.state = JobState::Completed;
            job.progress = 100;
            job.current_step = "Finished".to_string();
            job.result_paths = result_paths;
        }
    }

    pub async fn mark_failed(&self, id: &str, kind: &str, message: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            job.state = JobState::Failed;
            job.current_step = format!("Error: {message}");
            job.error = Some(JobError {
                kind: kind.to_string(),
                message,
            });
        }
    }

    pub async fn mark_cancelled(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            job.state = JobState::Cancelled;
            job.current_step = "Cancelled".to_string();
            job.error = Some(JobError {
                kind: "cancelled".to_string(),
                message: "cancelled by user".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let table = JobTable::new();
        let id = table
            .insert(Job::new(JobKind::Separate, "in.mp4".to_string()))
            .await;

        table.set_progress(&id, 40.0).await;
        table.set_progress(&id, 20.0).await;
        let snap = table.snapshot(&id).await.unwrap();
        assert_eq!(snap.progress, 40);

        table.set_progress(&id, 41.4).await;
        assert_eq!(table.snapshot(&id).await.unwrap().progress, 41);
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let table = JobTable::new();
        let id = table
            .insert(Job::new(JobKind::Separate, "in.mp4".to_string()))
            .await;

        table.mark_completed(&id, vec![PathBuf::from("out.mp4")]).await;
        table.mark_failed(&id, "internal", "late failure".to_string()).await;

        let snap = table.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, "completed");
        assert_eq!(snap.progress, 100);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_transitions() {
        let table = JobTable::new();
        let id = table
            .insert(Job::new(JobKind::Separate, "in.mp4".to_string()))
            .await;

        assert_eq!(table.cancel(&id).await, CancelOutcome::Accepted);
        // Flag is set; a second cancel before the worker notices is still
        // accepted because the job is not yet terminal.
        assert_eq!(table.cancel(&id).await, CancelOutcome::Accepted);

        table.mark_cancelled(&id).await;
        assert_eq!(table.cancel(&id).await, CancelOutcome::AlreadyTerminal);
        assert_eq!(table.cancel("nope").await, CancelOutcome::NotFound);

        let snap = table.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, "cancelled");
    }

    #[tokio::test]
    async fn test_snapshot_field_names_are_stable() {
        let table = JobTable::new();
        let id = table
            .insert(Job::new(JobKind::Download, "http://x".to_string()))
            .await;
        table.mark_running(&id).await;

        let snap = table.snapshot(&id).await.unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "processing");
        assert!(json.get("progress").is_some());
        assert!(json.get("current_step").is_some());
        assert!(json.get("result_files").is_some());
        assert!(json.get("metadata").is_some());
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_status() {
        let table = JobTable::new();
        let sep = table
            .insert(Job::new(JobKind::Separate, "a.mp4".to_string()))
            .await;
        let _dl = table
            .insert(Job::new(JobKind::Download, "http://x".to_string()))
            .await;
        table.mark_running(&sep).await;

        let all = table.list(&JobFilter::default()).await;
        assert_eq!(all.len(), 2);

        let downloads = table
            .list(&JobFilter {
                kind: Some(JobKind::Download),
                status: None,
            })
            .await;
        assert_eq!(downloads.len(), 1);

        let processing = table
            .list(&JobFilter {
                kind: None,
                status: Some("processing".to_string()),
            })
            .await;
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].task_id, sep);
    }

    #[test]
    fn test_model_selection_parsing() {
        assert_eq!(
            "spleeter".parse::<ModelSelection>().unwrap(),
            ModelSelection::Spleeter
        );
        assert_eq!("BOTH".parse::<ModelSelection>().unwrap(), ModelSelection::Both);
        assert!("vocalrem".parse::<ModelSelection>().is_err());
    }
}
