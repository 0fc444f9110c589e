use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::{DiagnosticsConfig, SETTINGS_FILE_NAME};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PersistentSettings {
    #[serde(default)]
    pub has_completed_onboarding: bool,
}

pub fn settings_path(config: &DiagnosticsConfig) -> PathBuf {
    config.settings_dir.join(SETTINGS_FILE_NAME)
}

pub fn load_settings(path: &Path) -> PersistentSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => PersistentSettings::default(),
    }
}

pub fn save_settings(path: &Path, settings: &PersistentSettings) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create settings directory {:?}: {}", parent, e);
            return;
        }
    }

    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save settings to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize settings: {}", e);
        }
    }
}
