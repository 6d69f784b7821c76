//! Job orchestration: the separation pipeline and the download jobs.
//!
//! One [`SeparationPipeline`] owns every active [`Job`]. Submissions are
//! non-blocking; work runs on spawned tasks bounded by worker semaphores,
//! and observers poll immutable [`JobSnapshot`]s.

mod config;
mod error;
mod job;
mod runner;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use job::{
    CancelOutcome, Job, JobError, JobFilter, JobId, JobKind, JobSnapshot, JobState, JobTable,
    ModelSelection, SeparationOptions,
};
pub use runner::SeparationPipeline;
