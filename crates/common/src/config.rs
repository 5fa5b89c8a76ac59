//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Export pipeline defaults.
    pub export: ExportDefaults,

    /// Playback host defaults.
    pub playback: PlaybackDefaults,

    /// Caption rendering defaults.
    pub render: RenderDefaults,

    /// Transcription collaborator settings.
    pub transcription: TranscriptionSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Capture frame rate of the composited surface.
    pub fps: u32,

    /// Target video bitrate in bits per second.
    pub video_bitrate_bps: u64,

    /// Container/codec of the output artifact.
    pub mime_type: String,

    /// Filename offered for the downloaded artifact.
    pub file_name: String,

    /// Wait after end-of-media before the recorder is stopped.
    pub settle_delay_ms: u64,

    /// Progress polling interval.
    pub progress_interval_ms: u64,

    /// Extra time allowed past the expected media end, and again past the
    /// recorder stop request, before a running export is declared stalled.
    /// `None` disables the watchdog.
    pub watchdog_grace_secs: Option<f64>,
}

/// Playback host parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    /// How often the host fires time-update events while playing.
    pub time_update_interval_ms: u64,
}

/// Caption rendering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Font used by the raster surface. When unset, common system
    /// locations are searched.
    pub font_path: Option<PathBuf>,

    /// Fraction of the frame width a wrapped line may occupy.
    pub max_line_width_ratio: f64,

    /// Line height as a multiple of the font size.
    pub line_height_factor: f64,
}

/// Transcription collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Name the API credential is stored under.
    pub credential_name: String,

    /// External program that reads a base64 audio payload on stdin and
    /// prints a JSON segment array on stdout.
    pub command: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "capburn=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate_bps: 12_000_000,
            mime_type: "video/webm;codecs=vp9,opus".to_string(),
            file_name: "captioned_capburn.webm".to_string(),
            settle_delay_ms: 800,
            progress_interval_ms: 100,
            watchdog_grace_secs: Some(30.0),
        }
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            time_update_interval_ms: 250,
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            font_path: None,
            max_line_width_ratio: 0.85,
            line_height_factor: 1.2,
        }
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            credential_name: "gemini_api_key".to_string(),
            command: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config directory.
pub fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("capburn")
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Standard credential file location.
pub fn credentials_file_path() -> PathBuf {
    config_dir().join("credentials.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_export_contract() {
        let config = AppConfig::default();
        assert_eq!(config.export.fps, 30);
        assert_eq!(config.export.settle_delay_ms, 800);
        assert_eq!(config.export.progress_interval_ms, 100);
        assert!(config.export.file_name.ends_with(".webm"));
        assert_eq!(config.transcription.credential_name, "gemini_api_key");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"export": {"fps": 60}}"#).expect("partial config parses");
        assert_eq!(parsed.export.fps, 60);
        assert_eq!(parsed.export.settle_delay_ms, 800);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.export.watchdog_grace_secs = None;
        config.save_to(&path).expect("save config");

        let loaded = AppConfig::load_from(&path);
        assert!(loaded.export.watchdog_grace_secs.is_none());
    }

    #[test]
    fn test_unparsable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");
        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.fps, 30);
    }
}
