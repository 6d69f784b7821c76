//! ffprobe JSON parsing and track selection.

use serde::Deserialize;
use std::path::Path;

use super::error::MediaError;
use super::types::{AudioTrack, MediaProbe};

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Deserialize, Default)]
struct ProbeTags {
    language: Option<String>,
}

pub(super) fn parse_probe_output(path: &Path, output: &str) -> Result<MediaProbe, MediaError> {
    let probe: ProbeOutput =
        serde_json::from_str(output).map_err(|e| MediaError::ProbeFailed {
            path: path.to_path_buf(),
            stderr_tail: format!("unparseable ffprobe output: {e}"),
        })?;

    let duration_s = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

    let audio_tracks: Vec<AudioTrack> = probe
        .streams
        .iter()
        .filter(|s| s.codec_type == "audio")
        .map(|s| AudioTrack {
            index: s.index,
            language: s
                .tags
                .language
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            codec: s.codec_name.clone(),
        })
        .collect();

    Ok(MediaProbe {
        duration_s,
        is_video: video_stream.is_some(),
        video_codec: video_stream.and_then(|s| s.codec_name.clone()),
        audio_codec: audio_tracks.first().and_then(|t| t.codec.clone()),
        resolution: video_stream.and_then(|s| match (s.width, s.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }),
        audio_tracks,
    })
}

/// Pick the audio stream the pipeline will extract.
///
/// The first track whose language matches the preference list wins
/// (list order is priority order); otherwise the first audio track.
pub fn select_primary_track<'a>(
    probe: &'a MediaProbe,
    language_preference: &[String],
) -> Option<&'a AudioTrack> {
    for lang in language_preference {
        if let Some(track) = probe
            .audio_tracks
            .iter()
            .find(|t| t.language.eq_ignore_ascii_case(lang))
        {
            return Some(track);
        }
    }
    probe.audio_tracks.first()
}
