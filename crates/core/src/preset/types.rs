use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    /// ffmpeg video codec, `"copy"` passes the stream through untouched.
    #[serde(default = "default_video_codec")]
    pub codec: String,
    /// e.g. `"1800k"`; only meaningful when re-encoding.
    #[serde(default)]
    pub bitrate: Option<String>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            bitrate: None,
        }
    }
}

fn default_video_codec() -> String {
    "copy".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_audio_codec")]
    pub codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: default_audio_codec(),
            bitrate: default_audio_bitrate(),
        }
    }
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> Option<String> {
    Some("192k".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_format")]
    pub format: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: default_output_format(),
        }
    }
}

fn default_output_format() -> String {
    "mp4".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    #[serde(default = "default_demucs_workers")]
    pub demucs_workers: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            demucs_workers: default_demucs_workers(),
        }
    }
}

fn default_demucs_workers() -> usize {
    2
}

/// One named output profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// On-disk shape of `video.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetFile {
    #[serde(default)]
    pub presets: HashMap<String, Preset>,
    #[serde(default)]
    pub current_preset: Option<String>,

    // Top-level section overrides; each wins over the selected preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingSettings>,
}

impl PresetFile {
    /// Resolve the effective preset: selected (or default) plus overrides.
    pub fn active(&self) -> Preset {
        let mut preset = self
            .current_preset
            .as_ref()
            .and_then(|name| self.presets.get(name))
            .cloned()
            .unwrap_or_default();

        if let Some(video) = &self.video {
            preset.video = video.clone();
        }
        if let Some(audio) = &self.audio {
            preset.audio = audio.clone();
        }
        if let Some(output) = &self.output {
            preset.output = output.clone();
        }
        preset
    }

    pub fn demucs_workers(&self) -> usize {
        self.processing
            .as_ref()
            .map(|p| p.demucs_workers)
            .unwrap_or_else(default_demucs_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipped_behavior() {
        let preset = Preset::default();
        assert_eq!(preset.video.codec, "copy");
        assert_eq!(preset.audio.codec, "aac");
        assert_eq!(preset.audio.bitrate.as_deref(), Some("192k"));
        assert_eq!(preset.output.format, "mp4");
    }

    #[test]
    fn test_active_resolves_selected_preset() {
        let mut file = PresetFile::default();
        file.presets.insert(
            "hq".to_string(),
            Preset {
                video: VideoSettings {
                    codec: "libx264".to_string(),
                    bitrate: Some("4000k".to_string()),
                },
                ..Default::default()
            },
        );
        file.current_preset = Some("hq".to_string());

        let active = file.active();
        assert_eq!(active.video.codec, "libx264");
        assert_eq!(active.audio.codec, "aac");
    }

    #[test]
    fn test_top_level_overrides_win() {
        let mut file = PresetFile::default();
        file.presets.insert("hq".to_string(), Preset::default());
        file.current_preset = Some("hq".to_string());
        file.audio = Some(AudioSettings {
            codec: "libopus".to_string(),
            bitrate: Some("128k".to_string()),
        });

        let active = file.active();
        assert_eq!(active.audio.codec, "libopus");
        assert_eq!(active.video.codec, "copy");
    }

    #[test]
    fn test_missing_selection_falls_back_to_default() {
        let file = PresetFile {
            current_preset: Some("does-not-exist".to_string()),
            ..Default::default()
        };
        assert_eq!(file.active(), Preset::default());
    }

    #[test]
    fn test_parses_original_shape() {
        let json = r#"{
            "video": { "codec": "copy", "bitrate": null },
            "audio": { "codec": "aac", "bitrate": "192k" },
            "output": { "format": "mp4" },
            "processing": { "demucs_workers": 2 }
        }"#;
        let file: PresetFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.demucs_workers(), 2);
        assert_eq!(file.active().output.format, "mp4");
    }
}
