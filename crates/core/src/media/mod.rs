//! ffprobe/ffmpeg wrappers: the only audio/video transform layer.
//!
//! Every media transformation in the service goes through the
//! [`MediaToolkit`] trait; drivers and the pipeline never build ffmpeg
//! command lines themselves. [`MediaTools`] is the ffmpeg-backed
//! implementation.

mod error;
mod ops;
mod probe;
mod traits;
mod types;

pub use error::MediaError;
pub use ops::{ExtractOptions, MediaTools, RemuxSettings};
pub use probe::select_primary_track;
pub use traits::MediaToolkit;
pub use types::{is_audio_file, is_media_file, is_video_file, AudioTrack, MediaProbe};
