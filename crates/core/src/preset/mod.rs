//! Output presets (`video.json`).
//!
//! A preset bundles the codec/bitrate/container settings the remux phase
//! applies. The file also accepts top-level section overrides, which win
//! over the selected preset.

mod store;
mod types;

pub use store::PresetStore;
pub use types::{
    AudioSettings, OutputSettings, Preset, PresetFile, ProcessingSettings, VideoSettings,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
