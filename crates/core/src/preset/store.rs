//! Single-writer preset store.

use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::warn;

use crate::jsonstore::{load_json, save_json_atomic};

use super::types::{Preset, PresetFile};
use super::PresetError;

/// Read-mostly holder of the `video.json` contents.
///
/// Reads take a shared lock and clone small structs; every mutation goes
/// through one guarded setter that rewrites the file atomically.
pub struct PresetStore {
    path: PathBuf,
    file: RwLock<PresetFile>,
}

impl PresetStore {
    /// Load the store, falling back to defaults when the file is missing
    /// or invalid (invalid files are preserved on disk, not overwritten).
    pub async fn load(path: PathBuf) -> Self {
        let file = match load_json::<PresetFile>(&path).await {
            Ok(Some(file)) => file,
            Ok(None) => PresetFile::default(),
            Err(e) => {
                warn!(path = %path.display(), "invalid preset file ({e}), using defaults");
                PresetFile::default()
            }
        };
        Self {
            path,
            file: RwLock::new(file),
        }
    }

    /// The effective output preset.
    pub async fn active(&self) -> Preset {
        self.file.read().await.active()
    }

    /// Segment workers for the Demucs driver.
    pub async fn demucs_workers(&self) -> usize {
        self.file.read().await.demucs_workers()
    }

    /// Snapshot of the whole file (for the API).
    pub async fn snapshot(&self) -> PresetFile {
        self.file.read().await.clone()
    }

    /// Select a named preset and persist.
    pub async fn set_current(&self, name: &str) -> Result<(), PresetError> {
        let mut file = self.file.write().await;
        if !file.presets.contains_key(name) {
            return Err(PresetError::UnknownPreset(name.to_string()));
        }
        file.current_preset = Some(name.to_string());
        save_json_atomic(&self.path, &*file).await?;
        Ok(())
    }

    /// Create or replace a named preset and persist.
    pub async fn upsert(&self, name: &str, preset: Preset) -> Result<(), PresetError> {
        let mut file = self.file.write().await;
        file.presets.insert(name.to_string(), preset);
        save_json_atomic(&self.path, &*file).await?;
        Ok(())
    }
}
