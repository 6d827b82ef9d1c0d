//! Player configuration for jam-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/jam-player/config.yaml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Metronome defaults applied at startup
    pub metronome: MetronomeConfig,
    /// Directory scanned for stem files when none is given on the
    /// command line. Default: ~/Music/jam-stems
    pub stems_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let stems_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Music")
            .join("jam-stems");

        Self {
            metronome: MetronomeConfig::default(),
            stems_dir,
        }
    }
}

/// Metronome configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Initial tempo (saved/restored between sessions)
    pub bpm: f64,
    /// Click volume, 0.0 - 1.0
    pub volume: f32,
    /// Whether the click is on at startup
    pub enabled: bool,
    /// Seconds of silence before the first beat of the song
    pub start_offset: f64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            volume: 0.7,
            enabled: false,
            start_offset: 0.0,
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/jam-player/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("jam-player")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> PlayerConfig {
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return PlayerConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<PlayerConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: Loaded config - BPM: {:.1}, click volume: {:.2}",
                    config.metronome.bpm,
                    config.metronome.volume
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                PlayerConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            PlayerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: PlayerConfig = serde_yaml::from_str("metronome:\n  bpm: 95.0\n").unwrap();
        assert_eq!(config.metronome.bpm, 95.0);
        assert_eq!(config.metronome.volume, 0.7);
        assert!(!config.metronome.enabled);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Path::new("/no/such/config.yaml"));
        assert_eq!(config.metronome.bpm, 120.0);
    }
}
