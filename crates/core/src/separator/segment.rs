//! Segmentation shared by both drivers.
//!
//! Inputs longer than the segment length are cut into contiguous,
//! non-overlapping slices, processed with bounded parallelism, and the
//! per-segment vocal outputs are rejoined with the ffmpeg concat demuxer.
//! Segment order is defined by start time; no reordering, no overlap.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use crate::cmd::CancelFlag;
use crate::media::MediaToolkit;

use super::error::SeparatorError;
use super::traits::StepProgress;

/// One planned slice of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub start_secs: f64,
    pub len_secs: f64,
}

impl Segment {
    pub fn file_name(&self) -> String {
        format!("part_{:03}.wav", self.index)
    }
}

/// Plan contiguous segments of at most `segment_len` seconds.
///
/// A duration at or below the limit yields a single segment covering the
/// whole input (the no-segmentation path).
pub fn plan_segments(duration_secs: f64, segment_len_secs: f64) -> Vec<Segment> {
    if duration_secs <= segment_len_secs {
        return vec![Segment {
            index: 0,
            start_secs: 0.0,
            len_secs: duration_secs,
        }];
    }

    let mut segments = Vec::new();
    let mut start = 0.0;
    let mut index = 0;
    while start < duration_secs {
        let len = (duration_secs - start).min(segment_len_secs);
        segments.push(Segment {
            index,
            start_secs: start,
            len_secs: len,
        });
        start += len;
        index += 1;
    }
    segments
}

/// What to do when one segment's model run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SegmentFailurePolicy {
    /// Propagate: the whole driver invocation fails.
    Fail,
    /// Substitute a silent segment of the same length and keep going.
    Silence,
}

/// Split, process with bounded parallelism, and rejoin.
///
/// `run_one` receives `(segment_index, slice_path)` and returns the vocal
/// WAV for that slice. Returns the concatenated vocal file.
#[allow(clippy::too_many_arguments)]
pub(super) async fn run_segmented<F, Fut>(
    which: &'static str,
    tools: &dyn MediaToolkit,
    wav_in: &Path,
    work_dir: &Path,
    duration_secs: f64,
    segment_len_secs: f64,
    workers: usize,
    policy: SegmentFailurePolicy,
    progress: &mpsc::Sender<StepProgress>,
    cancel: &CancelFlag,
    run_one: F,
) -> Result<PathBuf, SeparatorError>
where
    F: Fn(usize, PathBuf) -> Fut + Sync,
    Fut: Future<Output = Result<PathBuf, SeparatorError>> + Send,
{
    let plan = plan_segments(duration_secs, segment_len_secs);
    debug_assert!(plan.len() > 1, "caller handles the single-segment path");

    let segments_dir = work_dir.join("segments");
    tokio::fs::create_dir_all(&segments_dir).await?;

    // Slice sequentially; the cuts are cheap stream copies.
    let mut slices = Vec::with_capacity(plan.len());
    for segment in &plan {
        let slice_path = segments_dir.join(segment.file_name());
        tools
            .slice_wav(
                wav_in,
                &slice_path,
                segment.start_secs,
                segment.len_secs,
                cancel,
            )
            .await?;
        slices.push((segment.index, slice_path));
    }

    let _ = progress
        .send(StepProgress::new(
            0.0,
            format!("{which}: processing {} segments", plan.len()),
        ))
        .await;

    let total = slices.len();
    let completed = AtomicUsize::new(0);

    // Bounded parallelism over segments; results keep their index.
    let results: Vec<(usize, Result<Option<PathBuf>, SeparatorError>)> =
        stream::iter(slices.into_iter())
            .map(|(index, slice_path)| {
                let completed = &completed;
                let run_one = &run_one;
                async move {
                    if cancel.is_cancelled() {
                        return (index, Err(SeparatorError::Cancelled));
                    }

                    let result = match run_one(index, slice_path.clone()).await {
                        Ok(vocal) => Ok(Some(vocal)),
                        Err(SeparatorError::Cancelled) => Err(SeparatorError::Cancelled),
                        Err(e) if policy == SegmentFailurePolicy::Silence => {
                            warn!(
                                which,
                                segment = index,
                                "segment failed ({e}), substituting silence"
                            );
                            let silent = slice_path.with_file_name(format!(
                                "silent_{:03}.wav",
                                index
                            ));
                            match tools.silence_of(&slice_path, &silent, cancel).await {
                                Ok(()) => Ok(Some(silent)),
                                Err(_) => Ok(None),
                            }
                        }
                        Err(e) => Err(e),
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = progress
                        .send(StepProgress::new(
                            done as f32 / total as f32 * 100.0,
                            format!("{which}: segment {done}/{total}"),
                        ))
                        .await;

                    (index, result)
                }
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

    let mut ordered: Vec<(usize, Option<PathBuf>)> = Vec::with_capacity(total);
    for (index, result) in results {
        ordered.push((index, result?));
    }
    ordered.sort_by_key(|(index, _)| *index);

    let vocal_parts: Vec<PathBuf> = ordered.into_iter().filter_map(|(_, p)| p).collect();
    if vocal_parts.is_empty() {
        return Err(SeparatorError::NoOutput {
            which: which.to_string(),
            path: work_dir.to_path_buf(),
        });
    }

    let joined = work_dir.join("vocals_joined.wav");
    tools
        .concat(&vocal_parts, &segments_dir, &joined, cancel)
        .await?;

    Ok(joined)
}
