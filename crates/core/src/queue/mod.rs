//! The two work queues: the persistent download queue and the per-batch
//! folder queue. Both feed the same pipeline; neither performs media work
//! itself.

mod batch;
mod config;
mod download;
mod types;

pub use batch::{BatchManager, BatchStatus};
pub use config::QueueConfig;
pub use download::DownloadQueue;
pub use types::{
    BatchItem, BatchItemStatus, QueueAddRequest, QueueItem, QueueItemStatus, QueueSnapshot,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted on an item in an incompatible state.
    #[error("cannot {operation} item {id}: status is {status}")]
    InvalidState {
        id: String,
        status: String,
        operation: String,
    },

    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
