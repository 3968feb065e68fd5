//! Editor settings stored in `config.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::HISTORY_CAPACITY;
use crate::workers::DEFAULT_RESTART_AFTER;

pub const CONFIG_FILE: &str = "config.json";

/// Origin trusted by the intake bridge out of the box
pub const DEFAULT_ORIGIN: &str = "https://directpodcast.fr";

/// Which transcode engine backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    #[default]
    Native,
    Worker,
    Ffmpeg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineBackend,
    /// Worker binary; defaults to `clipcut-worker` next to the executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_path: Option<PathBuf>,
    #[serde(default = "default_restart_after")]
    pub worker_restart_after: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_restart_after() -> u32 { DEFAULT_RESTART_AFTER }
fn default_history_capacity() -> usize { HISTORY_CAPACITY }
fn default_allowed_origins() -> Vec<String> { vec![DEFAULT_ORIGIN.to_string()] }

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineBackend::default(),
            worker_path: None,
            worker_restart_after: default_restart_after(),
            history_capacity: default_history_capacity(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// `<data_local_dir>/clipcut`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipcut")
}

/// Load settings; a missing or unreadable file falls back to defaults
pub fn load_settings(data_dir: &Path) -> Settings {
    let path = data_dir.join(CONFIG_FILE);

    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Settings::default();
    }

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Failed to read settings file {:?}: {}", path, e);
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&content) {
        Ok(settings) => {
            tracing::info!(
                "Loaded settings from {:?}, engine={:?}",
                path,
                settings.engine
            );
            settings
        }
        Err(e) => {
            tracing::warn!("Failed to parse settings file {:?}: {}", path, e);
            Settings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(CONFIG_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(settings)?)?;
    tracing::info!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.engine, EngineBackend::Native);
        assert_eq!(settings.history_capacity, 5);
        assert_eq!(settings.allowed_origins, vec![DEFAULT_ORIGIN.to_string()]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"engine":"ffmpeg","historyCapacity":3}"#,
        )
        .unwrap();

        let settings = load_settings(dir.path());
        assert_eq!(settings.engine, EngineBackend::Ffmpeg);
        assert_eq!(settings.history_capacity, 3);
        assert_eq!(settings.worker_restart_after, DEFAULT_RESTART_AFTER);
    }

    #[test]
    fn test_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            engine: EngineBackend::Worker,
            worker_path: Some(PathBuf::from("/opt/clipcut-worker")),
            ..Settings::default()
        };
        save_settings(dir.path(), &settings).unwrap();
        assert_eq!(load_settings(dir.path()), settings);
    }
}
