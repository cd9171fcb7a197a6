use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::overlay::OverlayStyle;
use crate::detection::domain::detection_params::DetectionParams;

const CONFIG_DIR_NAME: &str = "facescope";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Extension used for screenshots.
    pub image_format: String,
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            image_format: "jpg".to_string(),
            jpeg_quality: 95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Pace used for video files whose container reports no frame rate.
    pub target_fps: f64,
    /// Detection runs on a frame shrunk by this factor; 1.0 disables it.
    pub resize_factor: f64,
    pub webcam_record_fps: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            resize_factor: 1.0,
            webcam_record_fps: super::constants::WEBCAM_RECORD_FPS,
        }
    }
}

/// Everything the binary can be configured with from a JSON file.
/// Missing keys keep their defaults; CLI flags override what is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub detection: DetectionParams,
    pub overlay: OverlayStyle,
    pub output: OutputConfig,
    pub playback: PlaybackConfig,
    pub model_path: Option<PathBuf>,
    pub model_url: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source: std::io::Error| {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: AppConfig =
            serde_json::from_str(&text).map_err(|source: serde_json::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `explicit` if given (a missing file is an error), otherwise the
    /// per-user config file when it exists, otherwise defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(self.playback.target_fps.is_finite() && self.playback.target_fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "playback.targetFps must be > 0, got {}",
                self.playback.target_fps
            )));
        }
        if !(self.playback.webcam_record_fps.is_finite() && self.playback.webcam_record_fps > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "playback.webcamRecordFps must be > 0, got {}",
                self.playback.webcam_record_fps
            )));
        }
        let factor = self.playback.resize_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "playback.resizeFactor must be in (0, 1], got {factor}"
            )));
        }
        if self.output.jpeg_quality == 0 || self.output.jpeg_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "output.jpegQuality must be in 1..=100, got {}",
                self.output.jpeg_quality
            )));
        }
        if self.output.image_format.trim().is_empty() {
            return Err(ConfigError::Invalid("output.imageFormat is empty".into()));
        }
        Ok(())
    }

    /// Delay between frames for sources with no native rate.
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.playback.target_fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output.dir, PathBuf::from("output"));
        assert_eq!(config.output.jpeg_quality, 95);
        assert_relative_eq!(config.playback.webcam_record_fps, 20.0);
    }

    #[test]
    fn test_fallback_delay_matches_target_fps() {
        let config = AppConfig::default();
        assert_eq!(config.fallback_delay().as_millis(), 33);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"detection": {"minNeighbors": 3}, "overlay": {"boxColor": [255, 0, 0]}}"#,
        );
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.detection.min_neighbors(), 3);
        assert_relative_eq!(config.detection.scale_factor(), 1.1);
        assert_eq!(config.overlay.box_color, [255, 0, 0]);
        assert_eq!(config.overlay.box_thickness, 2);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_or_default(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "{ not json");
        assert!(matches!(
            AppConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[rstest]
    #[case::scale_factor(r#"{"detection": {"scaleFactor": 1.0}}"#)]
    #[case::target_fps(r#"{"playback": {"targetFps": 0}}"#)]
    #[case::resize_factor(r#"{"playback": {"resizeFactor": 1.5}}"#)]
    #[case::jpeg_quality(r#"{"output": {"jpegQuality": 0}}"#)]
    #[case::image_format(r#"{"output": {"imageFormat": " "}}"#)]
    fn test_invalid_values_are_rejected(#[case] body: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), body);
        assert!(matches!(
            AppConfig::load(&path).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }
}
